use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Resolves the access token used for a repository.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// `force` bypasses any cached token and fetches a fresh one.
    async fn get_token(&self, owner: &str, repo: &str, force: bool) -> Result<Option<String>>;

    /// Forget the cached token for a repository.
    async fn clear_installation_token(&self, owner: &str, repo: &str);
}

pub type SharedTokenProvider = Arc<dyn TokenProvider>;

/// Where uncached tokens come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, owner: &str, repo: &str) -> Result<Option<String>>;
}

/// Tokens from `[tokens]`: a per-repository token, else the default one.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredTokenSource {
    default: Option<String>,
    repos: BTreeMap<String, String>,
}

impl ConfiguredTokenSource {
    pub fn new(default: Option<String>, repos: BTreeMap<String, String>) -> Self {
        Self { default, repos }
    }
}

#[async_trait]
impl TokenSource for ConfiguredTokenSource {
    async fn fetch(&self, owner: &str, repo: &str) -> Result<Option<String>> {
        Ok(self
            .repos
            .get(&format!("{}/{}", owner, repo))
            .or(self.default.as_ref())
            .cloned())
    }
}

/// Issues `<prefix>1`, `<prefix>2`, ... on successive fetches. Pairs with
/// `MockIssueClient` to simulate installation token rotation.
#[derive(Debug)]
pub struct SequentialTokenSource {
    prefix: String,
    issued: AtomicU64,
}

impl SequentialTokenSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: AtomicU64::new(0),
        }
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for SequentialTokenSource {
    async fn fetch(&self, _owner: &str, _repo: &str) -> Result<Option<String>> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("{}{}", self.prefix, n)))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    fetched_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, ttl: Duration) -> bool {
        // A negative age (clock moved backwards) counts as fresh.
        (Utc::now() - self.fetched_at)
            .to_std()
            .map_or(true, |age| age < ttl)
    }
}

/// Caching `TokenProvider` in front of a `TokenSource`.
pub struct InstallationTokens<S> {
    source: S,
    ttl: Duration,
    cache: Mutex<HashMap<(String, String), CachedToken>>,
}

impl<S: TokenSource> InstallationTokens<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<(String, String), CachedToken>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(owner: &str, repo: &str) -> (String, String) {
        (owner.to_string(), repo.to_string())
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for InstallationTokens<S> {
    async fn get_token(&self, owner: &str, repo: &str, force: bool) -> Result<Option<String>> {
        let key = Self::key(owner, repo);
        if !force {
            let cached = self
                .cache()
                .get(&key)
                .filter(|c| c.is_fresh(self.ttl))
                .map(|c| c.token.clone());
            if cached.is_some() {
                return Ok(cached);
            }
        }

        let Some(token) = self.source.fetch(owner, repo).await? else {
            debug!(owner, repo, "no token available");
            return Ok(None);
        };
        if force {
            info!(owner, repo, "fetched fresh token");
        }
        self.cache().insert(
            key,
            CachedToken {
                token: token.clone(),
                fetched_at: Utc::now(),
            },
        );
        Ok(Some(token))
    }

    async fn clear_installation_token(&self, owner: &str, repo: &str) {
        if self.cache().remove(&Self::key(owner, repo)).is_some() {
            info!(owner, repo, "cleared cached token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> InstallationTokens<SequentialTokenSource> {
        InstallationTokens::new(SequentialTokenSource::new("ghs_t"), Duration::from_secs(3300))
    }

    #[tokio::test]
    async fn test_token_is_cached_per_repo() {
        let tokens = tokens();
        let a = tokens.get_token("acme", "site", false).await.unwrap();
        let b = tokens.get_token("acme", "site", false).await.unwrap();
        assert_eq!(a.as_deref(), Some("ghs_t1"));
        assert_eq!(a, b);

        let other = tokens.get_token("acme", "docs", false).await.unwrap();
        assert_eq!(other.as_deref(), Some("ghs_t2"));
        assert_eq!(tokens.source().issued(), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_cache() {
        let tokens = tokens();
        tokens.get_token("acme", "site", false).await.unwrap();
        let fresh = tokens.get_token("acme", "site", true).await.unwrap();
        assert_eq!(fresh.as_deref(), Some("ghs_t2"));
        let cached = tokens.get_token("acme", "site", false).await.unwrap();
        assert_eq!(cached.as_deref(), Some("ghs_t2"));
    }

    #[tokio::test]
    async fn test_clear_forgets_token() {
        let tokens = tokens();
        tokens.get_token("acme", "site", false).await.unwrap();
        tokens.clear_installation_token("acme", "site").await;
        let next = tokens.get_token("acme", "site", false).await.unwrap();
        assert_eq!(next.as_deref(), Some("ghs_t2"));
    }

    #[tokio::test]
    async fn test_zero_ttl_always_refetches() {
        let tokens = InstallationTokens::new(SequentialTokenSource::new("ghs_t"), Duration::ZERO);
        tokens.get_token("acme", "site", false).await.unwrap();
        tokens.get_token("acme", "site", false).await.unwrap();
        assert_eq!(tokens.source().issued(), 2);
    }

    #[tokio::test]
    async fn test_configured_source_prefers_repo_token() {
        let mut repos = BTreeMap::new();
        repos.insert("acme/site".to_string(), "ghs_site".to_string());
        let source = ConfiguredTokenSource::new(Some("ghs_default".into()), repos);
        assert_eq!(source.fetch("acme", "site").await.unwrap().as_deref(), Some("ghs_site"));
        assert_eq!(source.fetch("acme", "docs").await.unwrap().as_deref(), Some("ghs_default"));

        let empty = InstallationTokens::new(ConfiguredTokenSource::default(), Duration::from_secs(60));
        assert_eq!(empty.get_token("acme", "site", false).await.unwrap(), None);
    }
}
