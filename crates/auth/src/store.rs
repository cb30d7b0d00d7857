//! Session storage contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use jobgate_core::SessionId;

use crate::session::{Session, SessionPolicy};

/// Session store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionStoreError {
    /// A freshly drawn id collided with a stored session.
    #[error("session id collision: {0}")]
    Conflict(SessionId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Session store abstraction.
///
/// Implementors provide the three storage primitives; `create_session` and
/// `lookup` are the operations callers use and are defined once here so that
/// every backend treats collisions, unknown ids and expiry the same way.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Must fail with `Conflict` if the id exists.
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Fetch a stored session by id, ignoring expiry.
    async fn fetch(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError>;

    /// Remove a session. Returns whether a session was removed.
    async fn revoke(&self, id: SessionId) -> Result<bool, SessionStoreError>;

    /// Validity policy applied by `lookup`.
    fn policy(&self) -> SessionPolicy;

    /// Create and store a session for an external identity token.
    async fn create_session(&self, identity_token: &str) -> Result<Session, SessionStoreError> {
        let session = Session::new(identity_token);
        self.insert(&session).await?;
        debug!(session_id = %session.id, user_id = %session.user_id, "session created");
        Ok(session)
    }

    /// Resolve a raw cookie value to a live session.
    ///
    /// Empty, malformed, unknown and expired ids all yield `Ok(None)`. Only
    /// the canonical spelling of an issued id matches.
    async fn lookup(&self, raw_id: &str) -> Result<Option<Session>, SessionStoreError> {
        let Ok(id) = raw_id.parse::<SessionId>() else {
            return Ok(None);
        };
        if id.to_string() != raw_id {
            return Ok(None);
        }

        let policy = self.policy();
        Ok(self
            .fetch(id)
            .await?
            .filter(|s| !s.is_expired(&policy, Utc::now())))
    }
}

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    policy: SessionPolicy,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SessionPolicy) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SessionStoreError {
    SessionStoreError::Storage("session lock poisoned".to_string())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        if sessions.contains_key(&session.id) {
            return Err(SessionStoreError::Conflict(session.id));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn fetch(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(&id).cloned())
    }

    async fn revoke(&self, id: SessionId) -> Result<bool, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(&id).is_some())
    }

    fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

#[async_trait]
impl<S> SessionStore for Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError> {
        (**self).insert(session).await
    }

    async fn fetch(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        (**self).fetch(id).await
    }

    async fn revoke(&self, id: SessionId) -> Result<bool, SessionStoreError> {
        (**self).revoke(id).await
    }

    fn policy(&self) -> SessionPolicy {
        (**self).policy()
    }
}
