//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `serve`   | `Serve`          |
//! | `sync`    | `Sync`           |
//! | `preview` | `Preview`        |
//! | `config`  | `Config`         |

pub mod config;
pub mod preview;
pub mod serve;
pub mod sync;

pub use config::cmd_config;
pub use preview::cmd_preview;
pub use serve::cmd_serve;
pub use sync::{SyncTarget, cmd_sync};
