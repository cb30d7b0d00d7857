//! Bot credential sources.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Username and password of the bot account.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct BotCredentials {
    pub username: String,
    pub password: String,
}

impl BotCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BotCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed secrets in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bot username is empty")]
    EmptyUsername,
}

/// Source of the bot account credentials.
pub trait SecretProvider: Send + Sync {
    fn bot_credentials(&self) -> Result<BotCredentials, SecretError>;
}

/// Reads `{"username": "...", "password": "..."}` from a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSecrets {
    path: PathBuf,
}

impl JsonFileSecrets {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretProvider for JsonFileSecrets {
    fn bot_credentials(&self) -> Result<BotCredentials, SecretError> {
        let raw = std::fs::read(&self.path).map_err(|source| SecretError::Read {
            path: self.path.clone(),
            source,
        })?;
        let creds: BotCredentials =
            serde_json::from_slice(&raw).map_err(|source| SecretError::Parse {
                path: self.path.clone(),
                source,
            })?;
        if creds.username.trim().is_empty() {
            return Err(SecretError::EmptyUsername);
        }
        Ok(creds)
    }
}

/// Fixed in-memory credentials (tests, embedding).
#[derive(Debug, Clone)]
pub struct StaticSecrets(BotCredentials);

impl StaticSecrets {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self(BotCredentials::new(username, password))
    }
}

impl SecretProvider for StaticSecrets {
    fn bot_credentials(&self) -> Result<BotCredentials, SecretError> {
        if self.0.username.trim().is_empty() {
            return Err(SecretError::EmptyUsername);
        }
        Ok(self.0.clone())
    }
}
