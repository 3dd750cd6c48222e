//! Headless editor sessions.
//!
//! An [`EditorSession`] owns a document and performs the issue actions a
//! rich-text editor offers on a selection: open the issue dialog, create an
//! issue from the selected text, rename an issue link, close or reopen the
//! linked issue. It also runs the status synchronizer when content is ready
//! and when the host regains focus.

pub mod context;
pub mod session;

pub use context::EditorContext;
pub use session::{DialogMode, DocumentEvent, EditorSession, IssueDialog, SubmitOutcome};
