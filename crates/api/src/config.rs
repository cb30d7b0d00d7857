//! Service configuration loaded from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::service::StartupError;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_COOKIE_NAME: &str = "jobgate-session";
pub const DEFAULT_DB_PATH: &str = "jobgate.db";
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:3000/api/v1";
pub const DEFAULT_BOT_SECRETS: &str = "bot.json";
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address for the HTTP server
    pub bind: SocketAddr,
    /// Cookie carrying the session id
    pub cookie_name: String,
    /// SQLite database file
    pub db_path: PathBuf,
    /// Identity provider API base URL
    pub provider_url: String,
    /// JSON file with the bot account credentials
    pub bot_secrets: PathBuf,
    /// Number of job workers
    pub workers: usize,
    /// Idle worker poll interval
    pub poll_interval: Duration,
    /// Session lifetime; `None` means sessions never expire
    pub session_ttl: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            bot_secrets: PathBuf::from(DEFAULT_BOT_SECRETS),
            workers: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            session_ttl: None,
        }
    }
}

impl Config {
    /// Read `JOBGATE_*` variables from the process environment.
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let bind = var("JOBGATE_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse()
            .map_err(|_| config_error("JOBGATE_BIND", &bind, "expected host:port"))?;

        let cookie_name = var("JOBGATE_COOKIE_NAME").unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());
        if cookie_name.is_empty() {
            return Err(config_error("JOBGATE_COOKIE_NAME", &cookie_name, "must not be empty"));
        }

        let workers = match var("JOBGATE_WORKERS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(config_error("JOBGATE_WORKERS", &raw, "expected a positive integer")),
            },
            None => DEFAULT_WORKERS,
        };

        let poll_interval = match var("JOBGATE_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                config_error("JOBGATE_POLL_INTERVAL_MS", &raw, "expected milliseconds")
            })?),
            None => DEFAULT_POLL_INTERVAL,
        };

        let session_ttl = match var("JOBGATE_SESSION_TTL_SECS") {
            Some(raw) if raw.is_empty() => None,
            Some(raw) => Some(Duration::from_secs(raw.parse().map_err(|_| {
                config_error("JOBGATE_SESSION_TTL_SECS", &raw, "expected seconds")
            })?)),
            None => None,
        };

        Ok(Self {
            bind,
            cookie_name,
            db_path: var("JOBGATE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            provider_url: var("JOBGATE_PROVIDER_URL").unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string()),
            bot_secrets: var("JOBGATE_BOT_SECRETS")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BOT_SECRETS)),
            workers,
            poll_interval,
            session_ttl,
        })
    }
}

fn config_error(key: &str, value: &str, expected: &str) -> StartupError {
    StartupError::Config(format!("{key}={value:?}: {expected}"))
}
