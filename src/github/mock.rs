//! In-memory `IssueClient` for tests and `serve --mock`.
//!
//! Issues live in memory per repository. Tokens can be revoked to make every
//! call fail with `PermissionDenied`, and one-off failures can be queued, so
//! callers can exercise the refresh-and-retry path without GitHub.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::instrument;

use super::client::IssueClient;
use super::types::{
    Issue, IssuePatch, IssueState, Label, ListFilters, NewIssue, StateFilter, ensure_issue_number,
    issue_url,
};
use crate::errors::GitHubError;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct RepoKey {
    owner: String,
    repo: String,
}

impl RepoKey {
    fn new(owner: &str, repo: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }
    }
}

/// One recorded call against the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCall {
    pub op: &'static str,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub number: Option<u64>,
}

/// Mock issue client that stores all state in memory.
#[derive(Default)]
pub struct MockIssueClient {
    /// (owner, repo) -> number -> issue
    issues: Mutex<HashMap<RepoKey, BTreeMap<u64, Issue>>>,

    /// Logins with write access, per repository
    collaborators: Mutex<HashMap<RepoKey, HashSet<String>>>,

    /// Every login has write access everywhere
    open_access: AtomicBool,

    /// Tokens that fail every call with `PermissionDenied`
    revoked: Mutex<HashSet<String>>,

    /// Errors returned by the next calls, oldest first
    failures: Mutex<VecDeque<GitHubError>>,

    call_log: Mutex<Vec<MockCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found() -> GitHubError {
    GitHubError::NotFound {
        message: "Not Found".to_string(),
    }
}

impl MockIssueClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an issue with a chosen number.
    pub fn add_issue(&self, owner: &str, repo: &str, number: u64, title: &str, state: IssueState) -> Issue {
        let issue = Issue {
            number,
            title: title.to_string(),
            body: None,
            state,
            html_url: issue_url(owner, repo, number),
            labels: Vec::new(),
            extra: serde_json::Map::new(),
        };
        lock(&self.issues)
            .entry(RepoKey::new(owner, repo))
            .or_default()
            .insert(number, issue.clone());
        issue
    }

    /// Change an issue's state behind the client's back, as another user would.
    pub fn set_state(&self, owner: &str, repo: &str, number: u64, state: IssueState) {
        if let Some(issue) = lock(&self.issues)
            .get_mut(&RepoKey::new(owner, repo))
            .and_then(|repo| repo.get_mut(&number))
        {
            issue.state = state;
        }
    }

    pub fn issue(&self, owner: &str, repo: &str, number: u64) -> Option<Issue> {
        lock(&self.issues)
            .get(&RepoKey::new(owner, repo))
            .and_then(|repo| repo.get(&number))
            .cloned()
    }

    pub fn grant_access(&self, owner: &str, repo: &str, login: &str) {
        lock(&self.collaborators)
            .entry(RepoKey::new(owner, repo))
            .or_default()
            .insert(login.to_string());
    }

    /// Grant write access on every repository to every login.
    pub fn grant_all(&self) {
        self.open_access.store(true, Ordering::Relaxed);
    }

    /// Make every call made with `token` fail as an installation missing a permission.
    pub fn revoke_token(&self, token: &str) {
        lock(&self.revoked).insert(token.to_string());
    }

    /// Queue an error for the next call.
    pub fn fail_next(&self, error: GitHubError) {
        lock(&self.failures).push_back(error);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        lock(&self.call_log).iter().filter(|c| c.op == op).count()
    }

    fn record(&self, op: &'static str, token: &str, owner: &str, repo: &str, number: Option<u64>) -> Result<(), GitHubError> {
        tracing::info!(target: "mock_github", op, owner, repo, ?number, "call");
        lock(&self.call_log).push(MockCall {
            op,
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        });
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        if lock(&self.revoked).contains(token) {
            return Err(GitHubError::PermissionDenied {
                message: "Resource not accessible by integration".to_string(),
                required: Some("issues=write".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IssueClient for MockIssueClient {
    #[instrument(skip(self, token), name = "MockIssueClient::list")]
    async fn list(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        filters: &ListFilters,
    ) -> Result<Vec<Issue>, GitHubError> {
        self.record("list", token, owner, repo, None)?;
        let wanted_labels: Vec<&str> = filters
            .labels
            .as_deref()
            .map(|l| l.split(',').map(str::trim).filter(|l| !l.is_empty()).collect())
            .unwrap_or_default();
        let issues = lock(&self.issues);
        let Some(repo_issues) = issues.get(&RepoKey::new(owner, repo)) else {
            return Ok(Vec::new());
        };
        // Newest first, like GitHub.
        let matching = repo_issues
            .values()
            .rev()
            .filter(|issue| match filters.state.unwrap_or(StateFilter::Open) {
                StateFilter::Open => issue.state == IssueState::Open,
                StateFilter::Closed => issue.state == IssueState::Closed,
                StateFilter::All => true,
            })
            .filter(|issue| {
                wanted_labels
                    .iter()
                    .all(|wanted| issue.labels.iter().any(|l| l.name == *wanted))
            })
            .cloned()
            .collect();
        Ok(matching)
    }

    #[instrument(skip(self, token), name = "MockIssueClient::get")]
    async fn get(&self, token: &str, owner: &str, repo: &str, number: u64) -> Result<Issue, GitHubError> {
        let number = ensure_issue_number(number)?;
        self.record("get", token, owner, repo, Some(number))?;
        self.issue(owner, repo, number).ok_or_else(not_found)
    }

    #[instrument(skip(self, token, issue), name = "MockIssueClient::create")]
    async fn create(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError> {
        issue.validate()?;
        self.record("create", token, owner, repo, None)?;
        let mut issues = lock(&self.issues);
        let repo_issues = issues.entry(RepoKey::new(owner, repo)).or_default();
        let number = repo_issues.keys().next_back().map_or(1, |n| n + 1);
        let created = Issue {
            number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            state: IssueState::Open,
            html_url: issue_url(owner, repo, number),
            labels: issue.labels.iter().map(Label::named).collect(),
            extra: serde_json::Map::new(),
        };
        repo_issues.insert(number, created.clone());
        Ok(created)
    }

    #[instrument(skip(self, token, patch), name = "MockIssueClient::update")]
    async fn update(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue, GitHubError> {
        let number = ensure_issue_number(number)?;
        self.record("update", token, owner, repo, Some(number))?;
        let mut issues = lock(&self.issues);
        let issue = issues
            .get_mut(&RepoKey::new(owner, repo))
            .and_then(|repo| repo.get_mut(&number))
            .ok_or_else(not_found)?;
        if let Some(title) = &patch.title {
            issue.title = title.clone();
        }
        if let Some(body) = &patch.body {
            issue.body = Some(body.clone());
        }
        if let Some(state) = patch.state {
            issue.state = state;
        }
        if let Some(labels) = &patch.labels {
            issue.labels = labels.iter().map(Label::named).collect();
        }
        Ok(issue.clone())
    }

    #[instrument(skip(self, token), name = "MockIssueClient::check_repo_access")]
    async fn check_repo_access(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        login: &str,
    ) -> Result<bool, GitHubError> {
        self.record("check_repo_access", token, owner, repo, None)?;
        if self.open_access.load(Ordering::Relaxed) {
            return Ok(true);
        }
        Ok(lock(&self.collaborators)
            .get(&RepoKey::new(owner, repo))
            .is_some_and(|logins| logins.contains(login)))
    }
}
