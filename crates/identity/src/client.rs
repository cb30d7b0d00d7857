//! Authenticated provider client handed to job actions.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::error::IdentityError;
use crate::provider::check_status;

/// Provider client bound to the bot account and its access token.
///
/// Cheap to clone; clones share the underlying connection pool. Once built it
/// is read-only.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
}

impl BotClient {
    pub fn new(base_url: &str, username: &str, token: &str) -> Result<Self, IdentityError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("jobgate-bot"));
        let mut auth = HeaderValue::from_str(&format!("token {}", token.trim()))
            .map_err(|_| IdentityError::InvalidToken("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| IdentityError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a provider path (`/repos/...`).
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// GET a path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, IdentityError> {
        const OP: &str = "bot get";
        let res = self
            .get(path)
            .send()
            .await
            .map_err(|e| IdentityError::request(OP, e))?;
        let res = check_status(OP, res).await?;
        res.json().await.map_err(|e| IdentityError::request(OP, e))
    }
}

impl core::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BotClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
