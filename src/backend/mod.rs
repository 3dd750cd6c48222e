//! Issue backends for the editor side.
//!
//! An [`IssueBackend`] is what an editor session talks to when it needs
//! remote issue data. [`RouteBackend`] goes through the HTTP issue routes
//! with a session; [`DirectBackend`] calls an [`IssueClient`] with a token.
//!
//! [`IssueClient`]: crate::github::IssueClient

pub mod direct;
pub mod route;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::BackendError;
use crate::github::{Issue, IssuePatch, NewIssue};

pub use direct::DirectBackend;
pub use route::RouteBackend;

/// Issue operations scoped to one repository.
#[async_trait]
pub trait IssueBackend: Send + Sync {
    /// Fetch several issues in one request. An empty slice makes no request.
    async fn fetch_many(&self, numbers: &[u64]) -> Result<Vec<Issue>, BackendError>;

    async fn create(&self, issue: &NewIssue) -> Result<Issue, BackendError>;

    async fn update(&self, number: u64, patch: &IssuePatch) -> Result<Issue, BackendError>;
}

pub type SharedIssueBackend = Arc<dyn IssueBackend>;
