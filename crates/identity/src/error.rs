use reqwest::StatusCode;
use thiserror::Error;

use crate::secrets::SecretError;

/// Failure while establishing or using the bot identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("bot credentials unavailable: {0}")]
    Secrets(#[from] SecretError),

    #[error("provider request failed ({operation}): {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider rejected {operation}: {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("invalid bot token: {0}")]
    InvalidToken(String),

    #[error("failed to build http client: {0}")]
    Client(String),
}

impl IdentityError {
    pub(crate) fn request(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Request { operation, source }
    }
}
