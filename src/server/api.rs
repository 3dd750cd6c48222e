use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{Auth, SharedSessionProvider, SharedTokenProvider};
use crate::errors::{GitHubError, RouteError};
use crate::github::types::{parse_issue_number, parse_issue_numbers};
use crate::github::{Issue, IssuePatch, IssueState, ListFilters, NewIssue, SharedIssueClient, StateFilter};

pub const ISSUE_CREATED: &str = "Issue created successfully";
pub const ISSUE_UPDATED: &str = "Issue updated successfully";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub sessions: SharedSessionProvider,
    pub tokens: SharedTokenProvider,
    pub issues: SharedIssueClient,
}

pub type SharedState = Arc<AppState>;

// ── Response envelope ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{status, message?, data?}`, the body of every issue route response
/// except the unauthenticated one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: &str, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: Some(message.to_string()),
            data: Some(data),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message),
            data: None,
        }
    }
}

/// GET returns one issue for `?number=` and a list otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IssueData {
    One(Issue),
    Many(Vec<Issue>),
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct IssuesQuery {
    pub number: Option<String>,
    pub numbers: Option<String>,
    pub state: Option<String>,
    pub labels: Option<String>,
    pub per_page: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    /// A JSON number or a numeric string
    pub number: Option<serde_json::Value>,
    pub state: Option<IssueState>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub labels: Option<Vec<String>>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    /// No session: HTTP 401 with an empty body.
    Unauthenticated,
    Route(RouteError),
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        ApiError::Route(err)
    }
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        ApiError::Route(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            ApiError::Route(err) => {
                warn!(error = %err, "issue route failed");
                (
                    StatusCode::OK,
                    Json(ApiResponse::<()>::error(err.to_string())),
                )
                    .into_response()
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/{owner}/{repo}/{branch}/github-issues",
            get(get_issues).post(create_issue).patch(update_issue),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Auth, ApiError> {
    let auth = state.sessions.get_auth(headers).await;
    if !auth.is_authenticated() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(auth)
}

async fn resolve_token(state: &AppState, owner: &str, repo: &str, force: bool) -> Result<String, RouteError> {
    state
        .tokens
        .get_token(owner, repo, force)
        .await?
        .ok_or(RouteError::TokenNotFound)
}

/// Writes by a user with a known GitHub identity need write access.
async fn require_write_access(
    state: &AppState,
    auth: &Auth,
    token: &str,
    owner: &str,
    repo: &str,
) -> Result<(), RouteError> {
    let Some(user) = auth.user.as_ref().filter(|u| u.github_id.is_some()) else {
        return Ok(());
    };
    if state.issues.check_repo_access(token, owner, repo, &user.login).await? {
        Ok(())
    } else {
        Err(RouteError::NoRepoAccess {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }
}

/// Run `op` with `token`. If GitHub reports that the installation lacks a
/// permission, drop the cached token, resolve a fresh one and run `op` once
/// more. Any other failure is returned as is.
pub async fn with_permission_retry<T, F, Fut>(
    state: &AppState,
    owner: &str,
    repo: &str,
    token: String,
    op: F,
) -> Result<T, RouteError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, GitHubError>>,
{
    match op(token).await {
        Err(err) if err.is_permission_denied() => {
            warn!(owner, repo, error = %err, "permission denied; refreshing token and retrying once");
            state.tokens.clear_installation_token(owner, repo).await;
            let fresh = resolve_token(state, owner, repo, true).await?;
            Ok(op(fresh).await?)
        }
        result => Ok(result?),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, RouteError> {
    serde_json::from_slice(body).map_err(|e| RouteError::InvalidBody(e.to_string()))
}

fn parse_u32(name: &str, raw: &Option<String>) -> Result<Option<u32>, RouteError> {
    raw.as_deref()
        .map(|v| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| RouteError::Other(anyhow::anyhow!("Invalid {}: {}", name, v)))
        })
        .transpose()
}

fn list_filters(query: &IssuesQuery) -> Result<ListFilters, RouteError> {
    let state = query
        .state
        .as_deref()
        .map(StateFilter::from_str)
        .transpose()
        .map_err(|e| RouteError::Other(anyhow::anyhow!(e)))?;
    Ok(ListFilters {
        state,
        labels: query.labels.clone().filter(|l| !l.trim().is_empty()),
        per_page: parse_u32("per_page", &query.per_page)?,
        page: parse_u32("page", &query.page)?,
    })
}

fn update_number(raw: Option<&serde_json::Value>) -> Result<u64, RouteError> {
    match raw {
        None | Some(serde_json::Value::Null) => Err(RouteError::NumberRequired),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .filter(|n| *n > 0)
            .ok_or_else(|| RouteError::InvalidNumber(n.to_string())),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Err(RouteError::NumberRequired),
        Some(serde_json::Value::String(s)) => {
            parse_issue_number(s).ok_or_else(|| RouteError::InvalidNumber(s.clone()))
        }
        Some(other) => Err(RouteError::InvalidNumber(other.to_string())),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn get_issues(
    State(state): State<SharedState>,
    Path((owner, repo, branch)): Path<(String, String, String)>,
    Query(query): Query<IssuesQuery>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<IssueData>>, ApiError> {
    authenticate(&state, &headers).await?;
    let token = resolve_token(&state, &owner, &repo, false).await?;
    let client = state.issues.as_ref();

    if let Some(raw) = query.number.as_deref() {
        let number = parse_issue_number(raw).ok_or_else(|| RouteError::InvalidNumber(raw.to_string()))?;
        let issue = client.get(&token, &owner, &repo, number).await?;
        return Ok(Json(ApiResponse::data(IssueData::One(issue))));
    }

    if let Some(raw) = query.numbers.as_deref() {
        let numbers = parse_issue_numbers(raw).map_err(RouteError::InvalidNumber)?;
        info!(%owner, %repo, %branch, count = numbers.len(), "fetching issues");
        let issues = try_join_all(
            numbers
                .iter()
                .map(|number| client.get(&token, &owner, &repo, *number)),
        )
        .await?;
        return Ok(Json(ApiResponse::data(IssueData::Many(issues))));
    }

    let filters = list_filters(&query)?;
    let issues = client.list(&token, &owner, &repo, &filters).await?;
    Ok(Json(ApiResponse::data(IssueData::Many(issues))))
}

async fn create_issue(
    State(state): State<SharedState>,
    Path((owner, repo, branch)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<Issue>>, ApiError> {
    let auth = authenticate(&state, &headers).await?;
    let request: CreateIssueRequest = parse_body(&body)?;
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or(RouteError::TitleRequired)?;
    let new_issue = NewIssue {
        title,
        body: request.body,
        labels: request.labels,
    };

    let token = resolve_token(&state, &owner, &repo, false).await?;
    require_write_access(&state, &auth, &token, &owner, &repo).await?;

    let client = state.issues.as_ref();
    let (owner_ref, repo_ref, issue_ref) = (owner.as_str(), repo.as_str(), &new_issue);
    let issue = with_permission_retry(&state, &owner, &repo, token, |token| async move {
        client.create(&token, owner_ref, repo_ref, issue_ref).await
    })
    .await?;

    info!(%owner, %repo, %branch, number = issue.number, "issue created");
    Ok(Json(ApiResponse::with_message(ISSUE_CREATED, issue)))
}

async fn update_issue(
    State(state): State<SharedState>,
    Path((owner, repo, branch)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<Issue>>, ApiError> {
    let auth = authenticate(&state, &headers).await?;
    let request: UpdateIssueRequest = parse_body(&body)?;
    let number = update_number(request.number.as_ref())?;
    let patch = IssuePatch {
        title: request.title,
        body: request.body,
        state: request.state,
        labels: request.labels,
    };

    let token = resolve_token(&state, &owner, &repo, false).await?;
    require_write_access(&state, &auth, &token, &owner, &repo).await?;

    let client = state.issues.as_ref();
    let (owner_ref, repo_ref, patch_ref) = (owner.as_str(), repo.as_str(), &patch);
    let issue = with_permission_retry(&state, &owner, &repo, token, |token| async move {
        client.update(&token, owner_ref, repo_ref, number, patch_ref).await
    })
    .await?;

    info!(%owner, %repo, %branch, number, state = %issue.state, "issue updated");
    Ok(Json(ApiResponse::with_message(ISSUE_UPDATED, issue)))
}
