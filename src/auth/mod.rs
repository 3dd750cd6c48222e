//! Caller identity and repository access tokens.
//!
//! - `session`: resolves the session and user behind a request
//! - `tokens`: per-repository token resolution with caching and forced refresh

pub mod session;
pub mod tokens;

use serde::{Deserialize, Serialize};

pub use session::{ConfiguredSessions, SessionProvider, SharedSessionProvider};
pub use tokens::{
    ConfiguredTokenSource, InstallationTokens, SequentialTokenSource, SharedTokenProvider,
    TokenProvider, TokenSource,
};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    /// Known GitHub identity. Writes are access-checked only when present.
    pub github_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
}

/// What a request is authenticated as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub user: Option<User>,
    pub session: Option<Session>,
}

impl Auth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}
