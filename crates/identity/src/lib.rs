//! `jobgate-identity`: the service's own identity at the git-hosting
//! provider.
//!
//! The [`IdentityBridge`] logs in as the bot account, reuses or mints an
//! access token and hands out an authenticated [`BotClient`] that job actions
//! use to talk to the provider.
//!
//! The `test-util` feature adds `MockProvider`, an in-process stand-in for
//! the provider's token endpoints.

pub mod bridge;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod provider;
pub mod secrets;

pub use bridge::{IdentityBridge, BOT_TOKEN_NAME};
pub use client::BotClient;
pub use error::IdentityError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockProvider, MockProviderHandle};
pub use provider::{AccessToken, CreateAccessTokenOption, ProviderClient};
pub use secrets::{BotCredentials, JsonFileSecrets, SecretError, SecretProvider, StaticSecrets};
