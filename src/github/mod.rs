//! GitHub issue API access.
//!
//! - `types`: issue representation, payloads and parsing helpers
//! - `client`: the `IssueClient` trait and its REST implementation
//! - `mock`: in-memory client for tests and offline serving

pub mod client;
pub mod mock;
pub mod types;

pub use client::{IssueClient, RestIssueClient, SharedIssueClient};
pub use mock::MockIssueClient;
pub use types::{Issue, IssuePatch, IssueState, ListFilters, NewIssue, StateFilter};
