use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::IssueBackend;
use crate::errors::BackendError;
use crate::github::{Issue, IssuePatch, NewIssue};
use crate::server::{ApiResponse, ResponseStatus};

/// Backend that calls the issue routes of an issuelink server.
#[derive(Debug, Clone)]
pub struct RouteBackend {
    http: Client,
    endpoint: Url,
    owner: String,
    repo: String,
    branch: String,
    session: Option<String>,
}

#[derive(Serialize)]
struct UpdatePayload<'a> {
    number: u64,
    #[serde(flatten)]
    patch: &'a IssuePatch,
}

impl RouteBackend {
    /// `endpoint` is the server root, e.g. `http://127.0.0.1:3141`.
    pub fn new(
        endpoint: &str,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| BackendError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::InvalidEndpoint(endpoint.to_string()));
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            session: None,
        })
    }

    /// Send `session` as the bearer credential on every request.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// `/api/{owner}/{repo}/{branch}/github-issues`, each segment percent-encoded.
    pub fn issues_url(&self) -> Result<Url, BackendError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(["api", &self.owner, &self.repo, &self.branch, "github-issues"]);
        Ok(url)
    }

    fn request(&self, method: Method) -> Result<RequestBuilder, BackendError> {
        let request = self.http.request(method, self.issues_url()?);
        Ok(match &self.session {
            Some(session) => request.bearer_auth(session),
            None => request,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(BackendError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let body: ApiResponse<T> = response.json().await?;
        match (body.status, body.data) {
            (ResponseStatus::Success, Some(data)) => Ok(data),
            (ResponseStatus::Success, None) => Err(BackendError::Remote(
                body.message.unwrap_or_else(|| "Response carried no data".to_string()),
            )),
            (ResponseStatus::Error, _) => Err(BackendError::Remote(body.message.unwrap_or_default())),
        }
    }
}

#[async_trait]
impl IssueBackend for RouteBackend {
    async fn fetch_many(&self, numbers: &[u64]) -> Result<Vec<Issue>, BackendError> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }
        let joined = numbers
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        debug!(numbers = %joined, "fetching issues");
        let request = self.request(Method::GET)?.query(&[("numbers", joined)]);
        self.send(request).await
    }

    async fn create(&self, issue: &NewIssue) -> Result<Issue, BackendError> {
        let request = self.request(Method::POST)?.json(issue);
        self.send(request).await
    }

    async fn update(&self, number: u64, patch: &IssuePatch) -> Result<Issue, BackendError> {
        let request = self
            .request(Method::PATCH)?
            .json(&UpdatePayload { number, patch });
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ConfiguredSessions, InstallationTokens, SequentialTokenSource};
    use crate::config::SessionEntry;
    use crate::github::{IssueState, MockIssueClient};
    use crate::server::{AppState, build_router};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn spawn_server(mock: Arc<MockIssueClient>) -> String {
        let state = Arc::new(AppState {
            sessions: Arc::new(ConfiguredSessions::new(&[SessionEntry {
                id: "s-bot".into(),
                login: "bot".into(),
                github_id: None,
            }])),
            tokens: Arc::new(InstallationTokens::new(
                SequentialTokenSource::new("ghs_route"),
                Duration::from_secs(600),
            )),
            issues: mock,
        });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, false)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_issues_url_encodes_branch() {
        let backend = RouteBackend::new("http://localhost:3141/", "acme", "site", "feature/new nav").unwrap();
        assert_eq!(
            backend.issues_url().unwrap().as_str(),
            "http://localhost:3141/api/acme/site/feature%2Fnew%20nav/github-issues"
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(
            RouteBackend::new("not a url", "a", "b", "main"),
            Err(BackendError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            RouteBackend::new("mailto:me@example.com", "a", "b", "main"),
            Err(BackendError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_create_update_through_routes() {
        let mock = Arc::new(MockIssueClient::new());
        mock.add_issue("acme", "site", 3, "Three", IssueState::Open);
        mock.add_issue("acme", "site", 7, "Seven", IssueState::Closed);
        let endpoint = spawn_server(mock.clone()).await;
        let backend = RouteBackend::new(&endpoint, "acme", "site", "release/1.0")
            .unwrap()
            .with_session("s-bot");

        let issues = backend.fetch_many(&[7, 3]).await.unwrap();
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![7, 3]);

        let created = backend
            .create(&NewIssue::new("Broken link").with_body("see page"))
            .await
            .unwrap();
        assert_eq!(created.number, 8);
        assert_eq!(created.state, IssueState::Open);

        let updated = backend
            .update(3, &IssuePatch::state(IssueState::Closed))
            .await
            .unwrap();
        assert_eq!(updated.state, IssueState::Closed);
        assert_eq!(mock.issue("acme", "site", 3).unwrap().state, IssueState::Closed);
    }

    #[tokio::test]
    async fn test_empty_fetch_makes_no_request() {
        let backend = RouteBackend::new("http://127.0.0.1:9", "acme", "site", "main").unwrap();
        assert!(backend.fetch_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_is_unauthenticated() {
        let endpoint = spawn_server(Arc::new(MockIssueClient::new())).await;
        let backend = RouteBackend::new(&endpoint, "acme", "site", "main").unwrap();
        let err = backend.fetch_many(&[1]).await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_error_envelope_becomes_remote_error() {
        let endpoint = spawn_server(Arc::new(MockIssueClient::new())).await;
        let backend = RouteBackend::new(&endpoint, "acme", "site", "main")
            .unwrap()
            .with_session("s-bot");
        let err = backend.create(&NewIssue::new("  ")).await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
    }
}
