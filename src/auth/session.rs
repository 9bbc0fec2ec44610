//! Per-login session state.
//!
//! A `Session` carries the user's identity and the master key derived at
//! login.  The key is held behind an `Arc` so request handlers can share it
//! read-only; it is zeroized when the last handle drops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::debug;

use crate::crypto::MasterKey;
use crate::errors::{FileVaultError, Result};

#[derive(Clone)]
pub struct Session {
    user_id: String,
    master_key: Option<Arc<MasterKey>>,
    expires_at: Instant,
}

impl Session {
    /// Start a session that holds `master_key` for `ttl`.  A `ttl` too large
    /// to represent as a deadline is a `ConfigError`.
    pub fn new(user_id: impl Into<String>, master_key: Arc<MasterKey>, ttl: Duration) -> Result<Self> {
        let expires_at = Instant::now().checked_add(ttl).ok_or_else(|| {
            FileVaultError::ConfigError(format!("session ttl of {}s is out of range", ttl.as_secs()))
        })?;
        Ok(Self {
            user_id: user_id.into(),
            master_key: Some(master_key),
            expires_at,
        })
    }

    /// A session that knows who the caller is but holds no key material.
    /// Enough for listing, not for anything that decrypts.
    pub fn identity_only(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            master_key: None,
            expires_at: Instant::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// The session master key, or `SessionExpired` if it was never set,
    /// has been dropped by `logout`, or the TTL has passed.
    pub fn master_key(&self) -> Result<Arc<MasterKey>> {
        match &self.master_key {
            Some(key) if !self.is_expired() => Ok(key.clone()),
            _ => Err(FileVaultError::SessionExpired),
        }
    }

    /// Drop this handle's reference to the master key.
    pub fn logout(&mut self) {
        self.master_key = None;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("has_key", &self.master_key.is_some())
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Opaque handle a client presents to resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: Session) -> Result<SessionToken>;

    /// Look a session up; missing or expired sessions are `SessionExpired`.
    async fn get(&self, token: &SessionToken) -> Result<Session>;

    async fn destroy(&self, token: &SessionToken) -> Result<()>;

    /// Drop every expired session and return how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Sessions kept in process memory only; keys never reach disk.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: Session) -> Result<SessionToken> {
        let token = SessionToken::generate();
        self.sessions.write().await.insert(token.clone(), session);
        Ok(token)
    }

    async fn get(&self, token: &SessionToken) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(token) {
            Some(session) if !session.is_expired() => Ok(session.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(FileVaultError::SessionExpired)
            }
            None => Err(FileVaultError::SessionExpired),
        }
    }

    async fn destroy(&self, token: &SessionToken) -> Result<()> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        let purged = before - sessions.len();
        if purged > 0 {
            debug!(purged, "expired sessions removed");
        }
        Ok(purged)
    }
}
