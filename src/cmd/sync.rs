//! One-shot issue status sync over a markup file: `issuelink sync`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use issuelink::backend::{DirectBackend, RouteBackend, SharedIssueBackend};
use issuelink::config::IssuelinkConfig;
use issuelink::document::Document;
use issuelink::github::RestIssueClient;
use issuelink::sync::{SyncTrigger, Synchronizer};

/// Repository and route to sync against.
pub struct SyncTarget {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub endpoint: Option<String>,
    pub session: Option<String>,
    pub token: Option<String>,
}

pub async fn cmd_sync(config: &IssuelinkConfig, file: &Path, target: SyncTarget, dry_run: bool) -> Result<()> {
    let markup = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut doc = Document::from_markup(&markup)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let synchronizer = Synchronizer::new(backend_for(config, &target)?);
    let changed = synchronizer.sync_document(&mut doc, SyncTrigger::Manual).await?;

    if changed == 0 {
        println!("{}: issue links up to date", file.display());
        return Ok(());
    }
    if dry_run {
        println!("{}: {} issue link(s) would change", file.display(), changed);
        return Ok(());
    }

    std::fs::write(file, doc.to_markup())
        .with_context(|| format!("Failed to write {}", file.display()))?;
    println!("{}: updated {} issue link(s)", file.display(), changed);
    Ok(())
}

fn backend_for(config: &IssuelinkConfig, target: &SyncTarget) -> Result<SharedIssueBackend> {
    if let Some(endpoint) = &target.endpoint {
        let mut backend = RouteBackend::new(endpoint, &target.owner, &target.repo, &target.branch)?;
        if let Some(session) = &target.session {
            backend = backend.with_session(session.clone());
        }
        return Ok(Arc::new(backend));
    }

    let toml = &config.toml;
    let repo_key = format!("{}/{}", target.owner, target.repo);
    let token = target
        .token
        .clone()
        .or_else(|| toml.tokens.repos.get(&repo_key).cloned())
        .or_else(|| toml.default_token())
        .with_context(|| {
            format!(
                "No GitHub token for {}: pass --token, set GITHUB_TOKEN or configure [tokens]",
                repo_key
            )
        })?;
    let client = RestIssueClient::new(toml.api_url(), toml.github.user_agent.clone(), toml.http_timeout())
        .context("Failed to build GitHub client")?;
    Ok(Arc::new(DirectBackend::new(
        Arc::new(client),
        token,
        &target.owner,
        &target.repo,
    )))
}
