//! Typed error hierarchy for issuelink.
//!
//! One enum per subsystem:
//! - `GitHubError`: remote issue API failures, classified from status and headers
//! - `RouteError`: route handler failures surfaced in the JSON envelope
//! - `BackendError`: failures of the editor-side issue backend
//! - `DocumentError`: markup parsing and text range failures
//! - `SyncError`: synchronizer failures
//! - `EditorError`: editor session action failures

use thiserror::Error;

/// Errors from the GitHub issue API.
///
/// Every variant carries the remote message and displays it unchanged, so the
/// text a caller shows is exactly what GitHub said. Callers branch on the
/// variant, never on the message.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// 401: the token is missing, malformed or expired.
    #[error("{message}")]
    Unauthorized { message: String },

    /// 403 without a permissions hint (rate limits, blocked users, ...).
    #[error("{message}")]
    Forbidden { message: String },

    /// 403 where GitHub names the permissions the installation lacks.
    #[error("{message}")]
    PermissionDenied {
        message: String,
        /// Content of `X-Accepted-GitHub-Permissions`, e.g. `issues=write`.
        required: Option<String>,
    },

    #[error("{message}")]
    NotFound { message: String },

    /// 422 from GitHub, or input rejected before any request was sent.
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Unknown { status: u16, message: String },

    #[error("{0}")]
    Transport(#[source] reqwest::Error),
}

impl GitHubError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// True when refreshing the installation token may fix the failure.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Errors from the issue route handlers.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Token not found")]
    TokenNotFound,

    #[error("No access to repository {owner}/{repo}.")]
    NoRepoAccess { owner: String, repo: String },

    #[error("Title is required")]
    TitleRequired,

    #[error("Issue number is required")]
    NumberRequired,

    #[error("Invalid issue number: {0}")]
    InvalidNumber(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from an editor-side `IssueBackend`.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The route answered with `status: "error"`.
    #[error("{0}")]
    Remote(String),

    #[error("Not signed in (HTTP 401)")]
    Unauthenticated,

    #[error("Unexpected response from issue service: HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Invalid issue service endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Issue service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

/// Errors from the document model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Range {from}..{to} is inverted")]
    InvertedRange { from: usize, to: usize },

    #[error("Range {from}..{to} is outside the document (length {len})")]
    OutOfBounds { from: usize, to: usize, len: usize },

    #[error("Malformed markup at byte {offset}: {message}")]
    Markup { offset: usize, message: String },
}

/// Errors from a synchronizer pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to sync issues: {0}")]
    Fetch(#[source] BackendError),
}

/// Errors from editor session actions.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("Title is required")]
    TitleRequired,

    #[error("This selection already contains an open issue.")]
    OpenIssueInSelection,

    #[error("No issue link in the current selection")]
    NoIssueLink,

    #[error("Issue dialog is not open")]
    DialogClosed,

    #[error("Another issue request is already in flight")]
    Busy,

    #[error("Editor session is closed")]
    SessionClosed,

    #[error("Created issue has no URL")]
    MissingIssueUrl,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
