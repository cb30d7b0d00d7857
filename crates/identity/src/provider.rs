//! Token endpoints of the git-hosting provider.
//!
//! Only the two calls the bridge needs are modelled:
//!
//! - `GET  {base}/users/{username}/tokens` → `[AccessToken]`
//! - `POST {base}/users/{username}/tokens` with `{"name"}` → `201 AccessToken`
//!
//! Both authenticate with the bot's username and password (HTTP basic auth).

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::secrets::BotCredentials;

/// Access token as returned by the provider.
///
/// Serialized lower-case; the capitalized spelling is accepted on input.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Sha1")]
    pub sha1: String,
}

impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessToken")
            .field("name", &self.name)
            .field("sha1", &"<redacted>")
            .finish()
    }
}

/// Request body for token creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccessTokenOption {
    #[serde(alias = "Name")]
    pub name: String,
}

/// Unauthenticated-by-token client used only for token management.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(base_url: &str) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IdentityError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn tokens_url(&self, username: &str) -> String {
        format!("{}/users/{}/tokens", self.base_url, username)
    }

    fn authed(&self, req: RequestBuilder, creds: &BotCredentials) -> RequestBuilder {
        req.basic_auth(&creds.username, Some(&creds.password))
    }

    /// List the existing access tokens of the credential's user.
    pub async fn list_access_tokens(
        &self,
        creds: &BotCredentials,
    ) -> Result<Vec<AccessToken>, IdentityError> {
        const OP: &str = "list access tokens";
        let req = self.authed(self.http.get(self.tokens_url(&creds.username)), creds);
        let res = req.send().await.map_err(|e| IdentityError::request(OP, e))?;
        let res = check_status(OP, res).await?;
        res.json().await.map_err(|e| IdentityError::request(OP, e))
    }

    /// Create a named access token for the credential's user.
    pub async fn create_access_token(
        &self,
        creds: &BotCredentials,
        opt: &CreateAccessTokenOption,
    ) -> Result<AccessToken, IdentityError> {
        const OP: &str = "create access token";
        let req = self.authed(self.http.post(self.tokens_url(&creds.username)), creds);
        let res = req
            .json(opt)
            .send()
            .await
            .map_err(|e| IdentityError::request(OP, e))?;
        let res = check_status(OP, res).await?;
        res.json().await.map_err(|e| IdentityError::request(OP, e))
    }
}

pub(crate) async fn check_status(
    operation: &'static str,
    res: Response,
) -> Result<Response, IdentityError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(IdentityError::Status {
        operation,
        status,
        body,
    })
}
