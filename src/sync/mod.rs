//! Issue status synchronization.
//!
//! Reconciliation itself is pure ([`reconcile`]); the [`Synchronizer`]
//! fetches the linked issues through an [`IssueBackend`] and applies the
//! result. Editor sessions drive it on content load and on focus.
//!
//! [`IssueBackend`]: crate::backend::IssueBackend

pub mod reconcile;

use std::fmt;

use tracing::{debug, info, warn};

use crate::backend::SharedIssueBackend;
use crate::document::Document;
use crate::errors::SyncError;
use crate::github::Issue;

pub use reconcile::{collect_issue_numbers, reconcile, reconcile_in_place};

/// What asked for a synchronizer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The document finished loading
    ContentReady,
    /// The host window regained focus
    Focus,
    /// An issue link was just changed by the user
    AfterChange,
    /// One-shot pass from the command line
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::ContentReady => "content-ready",
            SyncTrigger::Focus => "focus",
            SyncTrigger::AfterChange => "after-change",
            SyncTrigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

pub struct Synchronizer {
    backend: SharedIssueBackend,
}

impl Synchronizer {
    pub fn new(backend: SharedIssueBackend) -> Self {
        Self { backend }
    }

    /// Fetch the given issues. Failures are logged here.
    pub async fn fetch(&self, numbers: &[u64]) -> Result<Vec<Issue>, SyncError> {
        self.backend.fetch_many(numbers).await.map_err(|e| {
            warn!(error = %e, "Failed to sync issues");
            SyncError::Fetch(e)
        })
    }

    /// Run one pass over a document owned by the caller. Returns the number
    /// of rewritten links; on a fetch error `doc` is not touched.
    pub async fn sync_document(&self, doc: &mut Document, trigger: SyncTrigger) -> Result<usize, SyncError> {
        let numbers = collect_issue_numbers(doc);
        if numbers.is_empty() {
            debug!(%trigger, "no issue links to sync");
            return Ok(0);
        }
        let issues = self.fetch(&numbers).await?;
        let changed = reconcile_in_place(doc, &issues);
        info!(%trigger, linked = numbers.len(), changed, "issue links synced");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DirectBackend;
    use crate::github::{IssueState, MockIssueClient};
    use std::sync::Arc;

    const MARKUP: &str = concat!(
        "<p><a href=\"https://github.com/acme/site/issues/3\" data-issue-number=\"3\" data-issue-state=\"open\" class=\"gh-issue-link\">x</a>",
        " <a href=\"https://github.com/acme/site/issues/7\" data-issue-number=\"7\" data-issue-state=\"open\" class=\"gh-issue-link\">y</a>",
        " <a href=\"https://github.com/acme/site/issues/3\" data-issue-number=\"3\" data-issue-state=\"open\" class=\"gh-issue-link\">z</a>",
        " <a href=\"https://github.com/acme/site/issues/9\" data-issue-number=\"9\" data-issue-state=\"open\" class=\"gh-issue-link\">w</a></p>"
    );

    fn setup() -> (Arc<MockIssueClient>, Synchronizer) {
        let mock = Arc::new(MockIssueClient::new());
        for n in [3, 7, 9] {
            mock.add_issue("acme", "site", n, "t", IssueState::Open);
        }
        let backend = Arc::new(DirectBackend::new(mock.clone(), "ghs_sync", "acme", "site"));
        (mock, Synchronizer::new(backend))
    }

    #[tokio::test]
    async fn test_each_linked_issue_is_fetched_once() {
        let (mock, sync) = setup();
        let mut doc = Document::from_markup(MARKUP).unwrap();
        sync.sync_document(&mut doc, SyncTrigger::Manual).await.unwrap();
        let mut fetched: Vec<u64> = mock.calls().iter().filter_map(|c| c.number).collect();
        fetched.sort();
        assert_eq!(fetched, vec![3, 7, 9]);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let (mock, sync) = setup();
        mock.set_state("acme", "site", 7, IssueState::Closed);
        let mut doc = Document::from_markup(MARKUP).unwrap();
        assert_eq!(sync.sync_document(&mut doc, SyncTrigger::Manual).await.unwrap(), 1);
        assert_eq!(sync.sync_document(&mut doc, SyncTrigger::Focus).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_links_means_no_fetch() {
        let (mock, sync) = setup();
        let mut doc = Document::from_lines(&["plain"]);
        assert_eq!(sync.sync_document(&mut doc, SyncTrigger::ContentReady).await.unwrap(), 0);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_document_untouched() {
        let (mock, sync) = setup();
        mock.set_state("acme", "site", 3, IssueState::Closed);
        mock.fail_next(crate::errors::GitHubError::Unknown {
            status: 500,
            message: "boom".into(),
        });
        let mut doc = Document::from_markup(MARKUP).unwrap();
        let before = doc.clone();
        let err = sync.sync_document(&mut doc, SyncTrigger::Focus).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to sync issues: boom");
        assert_eq!(doc, before);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(SyncTrigger::ContentReady.to_string(), "content-ready");
        assert_eq!(SyncTrigger::Focus.to_string(), "focus");
    }
}
