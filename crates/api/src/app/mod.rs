//! HTTP application wiring (Axum router + shared handler state).
//!
//! - `routes/`: handlers, one file per area
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use jobgate_infra::jobs::JobStore;

use crate::form::FormSpec;
use crate::middleware::{self, GuardState};

pub mod errors;
pub mod routes;

/// State shared by the protected handlers.
pub struct AppServices {
    pub jobs: Arc<dyn JobStore>,
    pub form: Arc<FormSpec>,
}

/// Public information served by the login entry point.
#[derive(Debug, Clone)]
pub struct LoginInfo {
    pub cookie_name: Arc<str>,
    pub provider_url: Arc<str>,
}

/// Build the full HTTP router.
pub fn build_app(services: AppServices, guard: GuardState, login: LoginInfo) -> Router {
    // Protected routes: require a live session.
    let protected = routes::router()
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    guard,
                    middleware::route_guard,
                ))
                .layer(Extension(Arc::new(services))),
        );

    Router::new()
        .route("/health", get(routes::system::health))
        .route(middleware::LOGIN_PATH, get(routes::system::login))
        .layer(Extension(login))
        .merge(protected)
}
