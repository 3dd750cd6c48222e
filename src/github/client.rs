use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::types::{Issue, IssuePatch, ListFilters, NewIssue, ensure_issue_number};
use crate::errors::GitHubError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "issuelink";

/// Header GitHub attaches to 403 responses caused by a missing app permission.
const ACCEPTED_PERMISSIONS_HEADER: &str = "x-accepted-github-permissions";
const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// A spent rate limit; GitHub may still name the accepted permissions.
fn rate_limited(headers: &HeaderMap) -> bool {
    headers
        .get(RATE_LIMIT_REMAINING_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0")
}

/// The issue operations the route handlers proxy, scoped by an access token.
///
/// Implementations return the remote issue representation unchanged.
#[async_trait]
pub trait IssueClient: Send + Sync {
    async fn list(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        filters: &ListFilters,
    ) -> Result<Vec<Issue>, GitHubError>;

    async fn get(&self, token: &str, owner: &str, repo: &str, number: u64)
    -> Result<Issue, GitHubError>;

    async fn create(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError>;

    async fn update(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue, GitHubError>;

    /// Whether `login` may push to the repository (admin, maintain or write).
    async fn check_repo_access(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        login: &str,
    ) -> Result<bool, GitHubError>;
}

pub type SharedIssueClient = Arc<dyn IssueClient>;

/// `IssueClient` backed by the GitHub REST API.
pub struct RestIssueClient {
    http: Client,
    api_url: String,
    user_agent: String,
}

impl RestIssueClient {
    pub fn new(
        api_url: impl Into<String>,
        user_agent: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, GitHubError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(GitHubError::Transport)?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        })
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header("Authorization", format!("Bearer {}", token))
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GitHubError> {
        let response = request.send().await.map_err(GitHubError::Transport)?;
        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }
        response.json::<T>().await.map_err(GitHubError::Transport)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct PermissionBody {
    permission: String,
}

/// Turn a non-success response into a typed error, keeping GitHub's message.
async fn classify_failure(response: Response) -> GitHubError {
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                text.trim().to_string()
            }
        });
    classify_status(status, &headers, message)
}

pub(crate) fn classify_status(status: StatusCode, headers: &HeaderMap, message: String) -> GitHubError {
    match status {
        StatusCode::UNAUTHORIZED => GitHubError::Unauthorized { message },
        StatusCode::FORBIDDEN if rate_limited(headers) => GitHubError::Forbidden { message },
        StatusCode::FORBIDDEN => match headers.get(ACCEPTED_PERMISSIONS_HEADER) {
            Some(required) => GitHubError::PermissionDenied {
                message,
                required: required.to_str().ok().map(str::to_string),
            },
            None => GitHubError::Forbidden { message },
        },
        StatusCode::NOT_FOUND => GitHubError::NotFound { message },
        StatusCode::UNPROCESSABLE_ENTITY => GitHubError::Validation { message },
        other => GitHubError::Unknown {
            status: other.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl IssueClient for RestIssueClient {
    #[instrument(skip(self, token), name = "RestIssueClient::list")]
    async fn list(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        filters: &ListFilters,
    ) -> Result<Vec<Issue>, GitHubError> {
        let request = self
            .request(Method::GET, &format!("/repos/{}/{}/issues", owner, repo), token)
            .query(&filters.to_query());
        let issues: Vec<Issue> = self.send_json(request).await?;
        debug!(count = issues.len(), "listed issues");
        Ok(issues)
    }

    #[instrument(skip(self, token), name = "RestIssueClient::get")]
    async fn get(&self, token: &str, owner: &str, repo: &str, number: u64) -> Result<Issue, GitHubError> {
        let number = ensure_issue_number(number)?;
        let request = self.request(
            Method::GET,
            &format!("/repos/{}/{}/issues/{}", owner, repo, number),
            token,
        );
        self.send_json(request).await
    }

    #[instrument(skip(self, token, issue), fields(title = %issue.title), name = "RestIssueClient::create")]
    async fn create(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, GitHubError> {
        issue.validate()?;
        let request = self
            .request(Method::POST, &format!("/repos/{}/{}/issues", owner, repo), token)
            .json(issue);
        self.send_json(request).await
    }

    #[instrument(skip(self, token, patch), name = "RestIssueClient::update")]
    async fn update(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        number: u64,
        patch: &IssuePatch,
    ) -> Result<Issue, GitHubError> {
        let number = ensure_issue_number(number)?;
        let request = self
            .request(
                Method::PATCH,
                &format!("/repos/{}/{}/issues/{}", owner, repo, number),
                token,
            )
            .json(patch);
        self.send_json(request).await
    }

    #[instrument(skip(self, token), name = "RestIssueClient::check_repo_access")]
    async fn check_repo_access(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        login: &str,
    ) -> Result<bool, GitHubError> {
        let request = self.request(
            Method::GET,
            &format!("/repos/{}/{}/collaborators/{}/permission", owner, repo, login),
            token,
        );
        let response = request.send().await.map_err(GitHubError::Transport)?;
        if !response.status().is_success() {
            // Not a collaborator, or the installation cannot see collaborators.
            debug!(status = %response.status(), "permission lookup failed; treating as no access");
            return Ok(false);
        }
        let body: PermissionBody = response.json().await.map_err(GitHubError::Transport)?;
        Ok(matches!(body.permission.as_str(), "admin" | "maintain" | "write"))
    }
}
