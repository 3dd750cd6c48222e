//! HTTP route handlers proxying issue operations to GitHub.
//!
//! ```text
//! GET|POST|PATCH /api/{owner}/{repo}/{branch}/github-issues
//! GET            /health
//! ```

pub mod api;
#[allow(clippy::module_inception)]
pub mod server;

pub use api::{ApiResponse, AppState, IssueData, ResponseStatus, SharedState, api_router};
pub use server::{ServerConfig, build_router, start_server};
