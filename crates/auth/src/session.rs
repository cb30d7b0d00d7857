use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobgate_core::{SessionId, UserId};

/// Server-side login session.
///
/// Binds an opaque id (the cookie value) to the external identity token that
/// was presented at login. Sessions are never mutated after creation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub identity_token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build a fresh session for an identity token.
    pub fn new(identity_token: impl Into<String>) -> Self {
        let identity_token = identity_token.into();
        Self {
            id: SessionId::random(),
            user_id: UserId::from_identity(&identity_token),
            identity_token,
            created_at: Utc::now(),
        }
    }

    /// Whether the session is past its lifetime under `policy` at `now`.
    pub fn is_expired(&self, policy: &SessionPolicy, now: DateTime<Utc>) -> bool {
        let Some(ttl) = policy.ttl else {
            return false;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        match self.created_at.checked_add_signed(ttl) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

// The identity token is a credential; keep it out of logs.
impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Session validity policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Maximum session age. `None` means sessions never expire.
    pub ttl: Option<Duration>,
}

impl SessionPolicy {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}
