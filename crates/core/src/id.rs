//! Strongly-typed identifiers.
//!
//! Job ids, user ids and session ids live in distinct namespaces. Keeping them
//! as separate newtypes makes it a compile error to look a job up by its
//! owner's id.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a submitted job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

/// Identifier of the user owning a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

/// Opaque identifier of a login session (the cookie value).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

/// Namespace for deriving user ids from identity tokens.
const USER_NAMESPACE: Uuid = Uuid::from_u128(0x6a6f_6267_6174_6500_8000_0000_7573_6572);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(JobId, "JobId");
impl_uuid_newtype!(UserId, "UserId");
impl_uuid_newtype!(SessionId, "SessionId");

impl JobId {
    /// Create a new job id.
    ///
    /// Uses UUIDv7 (time-ordered), so ids sort roughly by submission time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl UserId {
    /// Derive the stable user id for an external identity token.
    ///
    /// The same token always maps to the same id; the token itself is never
    /// recoverable from it.
    pub fn from_identity(identity_token: &str) -> Self {
        Self(Uuid::new_v5(&USER_NAMESPACE, identity_token.as_bytes()))
    }
}

impl SessionId {
    /// Draw a fresh random session id (122 random bits).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}
