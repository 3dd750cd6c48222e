use async_trait::async_trait;
use futures::future::try_join_all;

use super::IssueBackend;
use crate::errors::BackendError;
use crate::github::{Issue, IssuePatch, NewIssue, SharedIssueClient};

/// Backend that calls an `IssueClient` directly with a fixed token. Used by
/// the CLI when no issuelink server is in between.
pub struct DirectBackend {
    client: SharedIssueClient,
    token: String,
    owner: String,
    repo: String,
}

impl DirectBackend {
    pub fn new(
        client: SharedIssueClient,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

#[async_trait]
impl IssueBackend for DirectBackend {
    async fn fetch_many(&self, numbers: &[u64]) -> Result<Vec<Issue>, BackendError> {
        let fetches = numbers
            .iter()
            .map(|&n| self.client.get(&self.token, &self.owner, &self.repo, n));
        Ok(try_join_all(fetches).await?)
    }

    async fn create(&self, issue: &NewIssue) -> Result<Issue, BackendError> {
        Ok(self
            .client
            .create(&self.token, &self.owner, &self.repo, issue)
            .await?)
    }

    async fn update(&self, number: u64, patch: &IssuePatch) -> Result<Issue, BackendError> {
        Ok(self
            .client
            .update(&self.token, &self.owner, &self.repo, number, patch)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{IssueState, MockIssueClient};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fetch_many_uses_token_and_keeps_order() {
        let mock = Arc::new(MockIssueClient::new());
        mock.add_issue("acme", "site", 1, "One", IssueState::Open);
        mock.add_issue("acme", "site", 2, "Two", IssueState::Closed);
        let backend = DirectBackend::new(mock.clone(), "ghs_direct", "acme", "site");

        let issues = backend.fetch_many(&[2, 1]).await.unwrap();
        assert_eq!(issues[0].title, "Two");
        assert_eq!(issues[1].title, "One");
        assert!(mock.calls().iter().all(|c| c.token == "ghs_direct"));
        assert!(backend.fetch_many(&[]).await.unwrap().is_empty());
        assert_eq!(mock.count_calls("get"), 2);
    }

    #[tokio::test]
    async fn test_missing_issue_fails_the_batch() {
        let mock = Arc::new(MockIssueClient::new());
        mock.add_issue("acme", "site", 1, "One", IssueState::Open);
        let backend = DirectBackend::new(mock, "ghs_direct", "acme", "site");
        let err = backend.fetch_many(&[1, 99]).await.unwrap_err();
        assert!(matches!(err, BackendError::GitHub(_)));
    }

    #[tokio::test]
    async fn test_update_state() {
        let mock = Arc::new(MockIssueClient::new());
        mock.add_issue("acme", "site", 4, "Four", IssueState::Open);
        let backend = DirectBackend::new(mock.clone(), "ghs_direct", "acme", "site");
        let issue = backend
            .update(4, &IssuePatch::state(IssueState::Closed))
            .await
            .unwrap();
        assert_eq!(issue.state, IssueState::Closed);
    }
}
