use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};

use super::{Auth, Session, User};
use crate::config::SessionEntry;

pub const SESSION_COOKIE: &str = "session";

/// Resolves the caller of a request.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_auth(&self, headers: &HeaderMap) -> Auth;
}

pub type SharedSessionProvider = Arc<dyn SessionProvider>;

/// Session id carried by a request: `Authorization: Bearer <id>`, or else the
/// `session` cookie.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(id) = bearer {
        return Some(id.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Sessions declared in `[[sessions]]` of issuelink.toml.
#[derive(Debug, Default)]
pub struct ConfiguredSessions {
    users: HashMap<String, User>,
}

impl ConfiguredSessions {
    pub fn new(entries: &[SessionEntry]) -> Self {
        let users = entries
            .iter()
            .map(|e| {
                (
                    e.id.clone(),
                    User {
                        login: e.login.clone(),
                        github_id: e.github_id,
                    },
                )
            })
            .collect();
        Self { users }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl SessionProvider for ConfiguredSessions {
    async fn get_auth(&self, headers: &HeaderMap) -> Auth {
        let Some(id) = session_id(headers) else {
            return Auth::anonymous();
        };
        match self.users.get(&id) {
            Some(user) => Auth {
                user: Some(user.clone()),
                session: Some(Session { id }),
            },
            None => {
                tracing::debug!("unknown session id");
                Auth::anonymous()
            }
        }
    }
}
