//! In-process stand-in for the provider's token endpoints.
//!
//! Each [`MockProvider`] owns its own token table, so tests never share state.
//! Minted tokens have the value `"{name}-token"`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::debug;

use crate::provider::{AccessToken, CreateAccessTokenOption};

#[derive(Debug, Default)]
struct MockState {
    tokens: Mutex<HashMap<String, Vec<AccessToken>>>,
    reject_credentials: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a token for `username`.
    pub fn with_token(self, username: &str, name: &str, sha1: &str) -> Self {
        self.table().entry(username.to_string()).or_default().push(AccessToken {
            name: name.to_string(),
            sha1: sha1.to_string(),
        });
        self
    }

    /// Answer every request with `401 Unauthorized`.
    pub fn reject_credentials(self) -> Self {
        self.state.reject_credentials.store(true, Ordering::SeqCst);
        self
    }

    /// Tokens currently held for `username`.
    pub fn tokens(&self, username: &str) -> Vec<AccessToken> {
        self.table().get(username).cloned().unwrap_or_default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<AccessToken>>> {
        self.state
            .tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/users/:username/tokens", get(list_tokens).post(add_token))
            .with_state(self.clone())
    }

    /// Serve the double on an ephemeral localhost port.
    pub async fn spawn(&self) -> std::io::Result<MockProviderHandle> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(MockProviderHandle { addr, handle })
    }
}

/// Running mock server; stopped on drop.
#[derive(Debug)]
pub struct MockProviderHandle {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl MockProviderHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockProviderHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn list_tokens(State(mock): State<MockProvider>, Path(username): Path<String>) -> Response {
    if mock.state.reject_credentials.load(Ordering::SeqCst) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    (StatusCode::OK, Json(mock.tokens(&username))).into_response()
}

async fn add_token(
    State(mock): State<MockProvider>,
    Path(username): Path<String>,
    Json(opt): Json<CreateAccessTokenOption>,
) -> Response {
    if mock.state.reject_credentials.load(Ordering::SeqCst) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let token = AccessToken {
        sha1: format!("{}-token", opt.name),
        name: opt.name,
    };
    mock.table().entry(username).or_default().push(token.clone());
    debug!(token_name = %token.name, "mock provider minted token");

    (StatusCode::CREATED, Json(token)).into_response()
}
