//! Bot login: reuse-or-create an access token and bind a [`BotClient`].

use std::sync::Arc;

use tracing::{Instrument, Span, info, info_span};

use crate::client::BotClient;
use crate::error::IdentityError;
use crate::provider::{AccessToken, CreateAccessTokenOption, ProviderClient};
use crate::secrets::{BotCredentials, SecretProvider};

/// Name given to the token the bridge creates when the bot has none.
pub const BOT_TOKEN_NAME: &str = "jobgate-bot";

/// Authenticates the service itself against the provider.
pub struct IdentityBridge {
    provider: ProviderClient,
    secrets: Arc<dyn SecretProvider>,
    token_name: String,
    span: Span,
}

impl IdentityBridge {
    pub fn new(
        provider_url: &str,
        secrets: Arc<dyn SecretProvider>,
    ) -> Result<Self, IdentityError> {
        Ok(Self {
            provider: ProviderClient::new(provider_url)?,
            secrets,
            token_name: BOT_TOKEN_NAME.to_string(),
            span: info_span!("identity_bridge", provider = %provider_url),
        })
    }

    /// Override the name used when a token has to be created.
    pub fn with_token_name(mut self, name: impl Into<String>) -> Self {
        self.token_name = name.into();
        self
    }

    /// Log events under `span` instead of the default component span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn provider_url(&self) -> &str {
        self.provider.base_url()
    }

    /// Read the bot credentials, resolve a token and build the bot client.
    ///
    /// Every failure is returned; callers treat it as fatal.
    pub async fn login(&self) -> Result<BotClient, IdentityError> {
        async {
            let creds = self.secrets.bot_credentials()?;
            let token = self.resolve_token(&creds).await?;
            if token.sha1.trim().is_empty() {
                return Err(IdentityError::InvalidToken(format!(
                    "provider returned an empty value for token {:?}",
                    token.name
                )));
            }
            let client = BotClient::new(self.provider.base_url(), &creds.username, &token.sha1)?;
            info!(username = %creds.username, token_name = %token.name, "bot logged in");
            Ok(client)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Return the bot's first existing token, or create exactly one.
    pub async fn resolve_token(&self, creds: &BotCredentials) -> Result<AccessToken, IdentityError> {
        let mut tokens = self.provider.list_access_tokens(creds).await?;
        if !tokens.is_empty() {
            let token = tokens.swap_remove(0);
            info!(username = %creds.username, token_name = %token.name, "reusing existing access token");
            return Ok(token);
        }

        let opt = CreateAccessTokenOption {
            name: self.token_name.clone(),
        };
        let token = self.provider.create_access_token(creds, &opt).await?;
        info!(username = %creds.username, token_name = %token.name, "created access token");
        Ok(token)
    }
}
