use axum::{Router, routing::get};

pub mod form;
pub mod log;
pub mod system;

/// Router for all session-guarded endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/", get(form::show).post(form::submit))
        .route("/log", get(log::list))
        .route("/log/:id", get(log::detail))
}
