use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use jobgate_auth::SessionStoreError;
use jobgate_infra::jobs::JobStoreError;

/// Failure of a request after it passed the route guard.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
    #[error(transparent)]
    Sessions(#[from] SessionStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
            ApiError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Jobs(JobStoreError::NotFound(_)) => {
                json_error(StatusCode::NOT_FOUND, "not_found", "not found")
            }
            ApiError::Jobs(e) if e.is_conflict() => {
                error!(error = %e, "job store conflict");
                json_error(StatusCode::CONFLICT, "conflict", e.to_string())
            }
            ApiError::Jobs(e) => {
                error!(error = %e, "job store failure");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
            }
            ApiError::Sessions(e) => {
                error!(error = %e, "session store failure");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "session_error", e.to_string())
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
