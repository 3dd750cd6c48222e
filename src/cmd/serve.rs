//! Issue route server command: `issuelink serve`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use issuelink::auth::{
    ConfiguredSessions, ConfiguredTokenSource, InstallationTokens, SequentialTokenSource,
};
use issuelink::config::{IssuelinkConfig, IssuelinkToml};
use issuelink::github::{MockIssueClient, RestIssueClient};
use issuelink::server::{AppState, ServerConfig, SharedState, start_server};

pub async fn cmd_serve(config: &IssuelinkConfig, port: Option<u16>, dev: bool, mock: bool) -> Result<()> {
    let toml = &config.toml;
    for warning in toml.validate() {
        warn!("config: {}", warning);
    }

    let state = if mock { mock_state(toml) } else { live_state(toml)? };
    let server = ServerConfig {
        host: toml.server.host.clone(),
        port: port.unwrap_or_else(|| toml.port()),
        dev_mode: dev || toml.server.dev,
    };
    start_server(server, state).await
}

fn sessions(toml: &IssuelinkToml) -> Arc<ConfiguredSessions> {
    let sessions = ConfiguredSessions::new(&toml.sessions);
    if sessions.is_empty() {
        warn!("no [[sessions]] configured; every issue request will be rejected with 401");
    }
    Arc::new(sessions)
}

fn live_state(toml: &IssuelinkToml) -> Result<SharedState> {
    let client = RestIssueClient::new(toml.api_url(), toml.github.user_agent.clone(), toml.http_timeout())
        .context("Failed to build GitHub client")?;

    let default_token = toml.default_token();
    if default_token.is_none() && toml.tokens.repos.is_empty() {
        warn!("no GitHub tokens configured; issue routes will answer \"Token not found\"");
    }
    let source = ConfiguredTokenSource::new(default_token, toml.tokens.repos.clone());

    info!(api_url = %toml.api_url(), "proxying issues to GitHub");
    Ok(Arc::new(AppState {
        sessions: sessions(toml),
        tokens: Arc::new(InstallationTokens::new(source, toml.token_ttl())),
        issues: Arc::new(client),
    }))
}

fn mock_state(toml: &IssuelinkToml) -> SharedState {
    let mock = MockIssueClient::new();
    mock.grant_all();
    info!("serving an in-memory GitHub; issues are lost on exit");
    Arc::new(AppState {
        sessions: sessions(toml),
        tokens: Arc::new(InstallationTokens::new(
            SequentialTokenSource::new("ghs_mock"),
            toml.token_ttl(),
        )),
        issues: Arc::new(mock),
    })
}
