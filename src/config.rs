//! Configuration for issuelink, read from `issuelink.toml`.
//!
//! Layering is file → environment → CLI flags. Every section has defaults,
//! so an absent file is equivalent to an empty one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev = false
//!
//! [github]
//! api_url = "https://api.github.com"
//! user_agent = "issuelink"
//! timeout_secs = 30
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! directory = "logs"
//!
//! [tokens]
//! default = "ghs_..."
//! ttl_minutes = 55
//!
//! [tokens.repos]
//! "acme/site" = "ghs_..."
//!
//! [[sessions]]
//! id = "local-dev"
//! login = "octocat"
//! github_id = 583231
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::github::client::{DEFAULT_API_URL, DEFAULT_USER_AGENT};
use crate::github::types::is_valid_github_token;

pub const CONFIG_FILE: &str = "issuelink.toml";

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served editor
    #[serde(default)]
    pub dev: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev: false,
        }
    }
}

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            api_url: None,
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write a daily rolling log file here in addition to stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
        }
    }
}

/// Statically configured access tokens, standing in for installation token minting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// `"owner/repo"` -> token
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
    /// How long a resolved token is reused before it is fetched again
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_ttl_minutes() -> u64 {
    55
}

impl Default for TokensSection {
    fn default() -> Self {
        Self {
            default: None,
            repos: BTreeMap::new(),
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// A session id accepted by the server and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_id: Option<u64>,
}

/// Parsed issuelink.toml configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuelinkToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub tokens: TokensSection,
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl IssuelinkToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse issuelink.toml")
    }

    /// Load configuration from `path`, or defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize issuelink.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Server port (env → file).
    pub fn port(&self) -> u16 {
        self.port_from(env_var)
    }

    fn port_from(&self, env: impl Fn(&str) -> Option<String>) -> u16 {
        env("ISSUELINK_PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(self.server.port)
    }

    /// Log filter directive (env → file).
    pub fn log_level(&self) -> String {
        self.log_level_from(env_var)
    }

    fn log_level_from(&self, env: impl Fn(&str) -> Option<String>) -> String {
        env("ISSUELINK_LOG").unwrap_or_else(|| self.logging.level.clone())
    }

    /// GitHub API base URL (file → env → default).
    pub fn api_url(&self) -> String {
        self.api_url_from(env_var)
    }

    fn api_url_from(&self, env: impl Fn(&str) -> Option<String>) -> String {
        self.github
            .api_url
            .clone()
            .or_else(|| env("GITHUB_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Fallback token for repositories without their own (file → env).
    pub fn default_token(&self) -> Option<String> {
        self.default_token_from(env_var)
    }

    fn default_token_from(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.tokens.default.clone().or_else(|| env("GITHUB_TOKEN"))
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.github.timeout_secs.map(Duration::from_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.tokens.ttl_minutes.saturating_mul(60))
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(token) = &self.tokens.default
            && !is_valid_github_token(token)
        {
            warnings.push("Default token does not look like a GitHub token".to_string());
        }

        for (repo, token) in &self.tokens.repos {
            if !is_repo_key(repo) {
                warnings.push(format!(
                    "Invalid repository key '{}' in [tokens.repos]: expected 'owner/repo'",
                    repo
                ));
            }
            if !is_valid_github_token(token) {
                warnings.push(format!("Token for '{}' does not look like a GitHub token", repo));
            }
        }

        if self.tokens.ttl_minutes == 0 {
            warnings.push("tokens.ttl_minutes is 0: every request will fetch a new token".to_string());
        }

        let mut seen = HashSet::new();
        for session in &self.sessions {
            if session.id.trim().is_empty() {
                warnings.push(format!("Session for '{}' has an empty id", session.login));
            } else if !seen.insert(session.id.as_str()) {
                warnings.push(format!("Duplicate session id '{}'", session.id));
            }
            if session.login.trim().is_empty() {
                warnings.push(format!("Session '{}' has an empty login", session.id));
            }
        }

        if let Some(url) = &self.github.api_url
            && !(url.starts_with("https://") || url.starts_with("http://"))
        {
            warnings.push(format!("github.api_url '{}' is not an http(s) URL", url));
        }

        warnings
    }
}

fn is_repo_key(key: &str) -> bool {
    matches!(key.split_once('/'), Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/'))
}

/// Runtime configuration: the parsed file plus its location.
#[derive(Debug, Clone)]
pub struct IssuelinkConfig {
    pub path: PathBuf,
    pub toml: IssuelinkToml,
}

impl IssuelinkConfig {
    /// Load from `path`, falling back to `./issuelink.toml`.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let toml = IssuelinkToml::load_or_default(&path)?;
        Ok(Self { path, toml })
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_empty() {
        let toml = IssuelinkToml::parse("").unwrap();
        assert_eq!(toml.server.port, 3141);
        assert_eq!(toml.server.host, "127.0.0.1");
        assert_eq!(toml.logging.format, LogFormat::Pretty);
        assert_eq!(toml.tokens.ttl_minutes, 55);
        assert!(toml.sessions.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let content = r#"
[server]
port = 8080
dev = true

[github]
api_url = "http://localhost:9000"
timeout_secs = 10

[logging]
level = "debug"
format = "json"

[tokens]
default = "ghs_default"

[tokens.repos]
"acme/site" = "ghs_site"

[[sessions]]
id = "s1"
login = "octocat"
github_id = 1

[[sessions]]
id = "s2"
login = "hubot"
"#;
        let toml = IssuelinkToml::parse(content).unwrap();
        assert_eq!(toml.server.port, 8080);
        assert!(toml.server.dev);
        assert_eq!(toml.api_url_from(no_env), "http://localhost:9000");
        assert_eq!(toml.http_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(toml.logging.format, LogFormat::Json);
        assert_eq!(toml.tokens.repos["acme/site"], "ghs_site");
        assert_eq!(toml.sessions.len(), 2);
        assert_eq!(toml.sessions[0].github_id, Some(1));
        assert_eq!(toml.sessions[1].github_id, None);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_invalid_toml_is_error() {
        assert!(IssuelinkToml::parse("[server\nport = ").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let toml = IssuelinkToml::default();
        let env = |key: &str| match key {
            "ISSUELINK_PORT" => Some("9999".to_string()),
            "ISSUELINK_LOG" => Some("trace".to_string()),
            "GITHUB_API_URL" => Some("http://ghe.local/api/v3".to_string()),
            "GITHUB_TOKEN" => Some("ghp_env".to_string()),
            _ => None,
        };
        assert_eq!(toml.port_from(env), 9999);
        assert_eq!(toml.log_level_from(env), "trace");
        assert_eq!(toml.api_url_from(env), "http://ghe.local/api/v3");
        assert_eq!(toml.default_token_from(env).as_deref(), Some("ghp_env"));

        assert_eq!(toml.port_from(no_env), 3141);
        assert_eq!(toml.api_url_from(no_env), DEFAULT_API_URL);
        assert_eq!(toml.default_token_from(no_env), None);
    }

    #[test]
    fn test_file_token_beats_env_token() {
        let mut toml = IssuelinkToml::default();
        toml.tokens.default = Some("ghs_file".into());
        let env = |_: &str| Some("ghp_env".to_string());
        assert_eq!(toml.default_token_from(env).as_deref(), Some("ghs_file"));
    }

    #[test]
    fn test_unparseable_port_env_falls_back() {
        let toml = IssuelinkToml::default();
        assert_eq!(toml.port_from(|_| Some("abc".into())), 3141);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut toml = IssuelinkToml::default();
        toml.tokens.default = Some("not-a-token".into());
        toml.tokens.repos.insert("acme".into(), "ghs_x".into());
        toml.tokens.ttl_minutes = 0;
        toml.sessions = vec![
            SessionEntry {
                id: "a".into(),
                login: "octocat".into(),
                github_id: None,
            },
            SessionEntry {
                id: "a".into(),
                login: "".into(),
                github_id: None,
            },
        ];
        let warnings = toml.validate();
        assert!(warnings.iter().any(|w| w.contains("Default token")));
        assert!(warnings.iter().any(|w| w.contains("'acme'")));
        assert!(warnings.iter().any(|w| w.contains("ttl_minutes")));
        assert!(warnings.iter().any(|w| w.contains("Duplicate session id 'a'")));
        assert!(warnings.iter().any(|w| w.contains("empty login")));
    }

    #[test]
    fn test_repo_key_shape() {
        assert!(is_repo_key("acme/site"));
        assert!(!is_repo_key("acme"));
        assert!(!is_repo_key("/site"));
        assert!(!is_repo_key("acme/site/extra"));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut toml = IssuelinkToml::default();
        toml.server.port = 4000;
        toml.tokens.repos.insert("acme/site".into(), "ghs_site".into());
        toml.save(&path).unwrap();

        let loaded = IssuelinkToml::load(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
        assert_eq!(loaded.tokens.repos["acme/site"], "ghs_site");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let toml = IssuelinkToml::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(toml.server.port, 3141);
    }

    #[test]
    fn test_config_new_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nport = 7000\n").unwrap();
        let config = IssuelinkConfig::new(Some(path.clone())).unwrap();
        assert!(config.exists());
        assert_eq!(config.path, path);
        assert_eq!(config.toml.server.port, 7000);
    }
}
