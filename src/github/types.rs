use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GitHubError;

/// Open/closed state of a GitHub issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid issue state: {}", s)),
        }
    }
}

/// State filter for listing issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

impl FromStr for StateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "all" => Ok(Self::All),
            _ => Err(format!("Invalid state filter: {}", s)),
        }
    }
}

/// A GitHub issue label. Fields other than `name` pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Label {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A GitHub issue as returned by the REST API.
///
/// The fields this crate reads are typed; everything else GitHub sends is
/// kept in `extra` so that route responses forward the remote representation
/// without dropping anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    pub html_url: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Query filters for `IssueClient::list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilters {
    pub state: Option<StateFilter>,
    /// Comma-separated label names.
    pub labels: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

impl ListFilters {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(state) = self.state {
            query.push(("state", state.as_str().to_string()));
        }
        if let Some(labels) = &self.labels {
            query.push(("labels", labels.clone()));
        }
        if let Some(per_page) = self.per_page {
            query.push(("per_page", per_page.to_string()));
        }
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        query
    }
}

/// Payload for creating an issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// A whitespace-only title counts as missing.
    pub fn validate(&self) -> Result<(), GitHubError> {
        if self.title.trim().is_empty() {
            return Err(GitHubError::validation("Title is required"));
        }
        Ok(())
    }
}

/// Partial update for an existing issue. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl IssuePatch {
    pub fn state(state: IssueState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

}

/// Validate an issue number received from outside.
pub fn ensure_issue_number(number: u64) -> Result<u64, GitHubError> {
    if number == 0 {
        return Err(GitHubError::validation(
            "Issue number must be a positive integer",
        ));
    }
    Ok(number)
}

/// Parse a single positive issue number.
pub fn parse_issue_number(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|n| *n > 0)
}

/// Parse a comma-separated list of issue numbers, e.g. `3,7,9`.
/// Returns the first malformed element on failure.
pub fn parse_issue_numbers(raw: &str) -> Result<Vec<u64>, String> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_issue_number(part).ok_or_else(|| part.trim().to_string()))
        .collect()
}

/// Browser URL of an issue.
pub fn issue_url(owner: &str, repo: &str, number: u64) -> String {
    format!("https://github.com/{}/{}/issues/{}", owner, repo, number)
}

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server (installation) tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Format check for a GitHub token based on its prefix. Does not verify
/// that the token is active.
pub fn is_valid_github_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    GITHUB_TOKEN_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Issue deserialization ────────────────────────────────────────

    #[test]
    fn test_issue_keeps_unknown_fields() {
        let json = r#"{
            "number": 42,
            "title": "Bug: something broken",
            "body": "Steps to reproduce...",
            "state": "open",
            "html_url": "https://github.com/owner/repo/issues/42",
            "labels": [{"name": "bug", "color": "d73a4a"}],
            "comments": 3,
            "user": {"login": "octocat"}
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.state, IssueState::Open);
        assert_eq!(issue.labels[0].name, "bug");
        assert_eq!(issue.extra["comments"], 3);

        let back = serde_json::to_value(&issue).unwrap();
        assert_eq!(back["user"]["login"], "octocat");
        assert_eq!(back["labels"][0]["color"], "d73a4a");
    }

    #[test]
    fn test_issue_null_body() {
        let json = r#"{"number": 1, "title": "t", "body": null, "state": "closed",
                       "html_url": "https://github.com/o/r/issues/1"}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert!(issue.body.is_none());
        assert_eq!(issue.state, IssueState::Closed);
    }

    // ── Payloads ─────────────────────────────────────────────────────

    #[test]
    fn test_new_issue_requires_title() {
        assert!(NewIssue::new("").validate().is_err());
        assert!(NewIssue::new("   ").validate().is_err());
        assert!(NewIssue::new("Fix typo").validate().is_ok());
    }

    #[test]
    fn test_patch_serializes_only_present_fields() {
        let patch = IssuePatch::state(IssueState::Closed);
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"state": "closed"}));
    }

    #[test]
    fn test_list_filters_query() {
        let filters = ListFilters {
            state: Some(StateFilter::All),
            labels: Some("bug,docs".into()),
            per_page: None,
            page: Some(2),
        };
        assert_eq!(
            filters.to_query(),
            vec![
                ("state", "all".to_string()),
                ("labels", "bug,docs".to_string()),
                ("page", "2".to_string()),
            ]
        );
        assert!(ListFilters::default().to_query().is_empty());
    }

    // ── Numbers and URLs ─────────────────────────────────────────────

    #[test]
    fn test_parse_issue_numbers() {
        assert_eq!(parse_issue_numbers("3,7,3,9"), Ok(vec![3, 7, 3, 9]));
        assert_eq!(parse_issue_numbers(" 1 , 2 "), Ok(vec![1, 2]));
        assert_eq!(parse_issue_numbers("1,,2"), Ok(vec![1, 2]));
        assert_eq!(parse_issue_numbers("1,x"), Err("x".to_string()));
        assert_eq!(parse_issue_numbers("0"), Err("0".to_string()));
    }

    #[test]
    fn test_ensure_issue_number_rejects_zero() {
        assert!(ensure_issue_number(0).is_err());
        assert_eq!(ensure_issue_number(5).unwrap(), 5);
    }

    #[test]
    fn test_issue_url() {
        assert_eq!(issue_url("acme", "site", 9), "https://github.com/acme/site/issues/9");
    }

    // ── is_valid_github_token ────────────────────────────────────────

    #[test]
    fn test_installation_token_is_valid() {
        assert!(is_valid_github_token("ghs_abc123"));
    }

    #[test]
    fn test_fine_grained_pat_is_valid() {
        assert!(is_valid_github_token("github_pat_abc123def456"));
    }

    #[test]
    fn test_empty_and_unknown_tokens_are_invalid() {
        assert!(!is_valid_github_token(""));
        assert!(!is_valid_github_token("not-a-token"));
        assert!(!is_valid_github_token("GHS_abc"));
        assert!(!is_valid_github_token(" ghs_abc"));
    }

    #[test]
    fn test_github_token_prefixes_end_with_underscore() {
        for prefix in GITHUB_TOKEN_PREFIXES {
            assert!(prefix.ends_with('_'), "bad prefix: {}", prefix);
        }
    }
}
