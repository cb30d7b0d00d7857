use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::app::LoginInfo;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Login entry point. Sessions are minted by the login exchange against the
/// identity provider; this endpoint only tells the caller where to go.
pub async fn login(Extension(info): Extension<LoginInfo>) -> impl IntoResponse {
    Json(json!({
        "message": "authentication required",
        "provider": &*info.provider_url,
        "cookie": &*info.cookie_name,
    }))
}
