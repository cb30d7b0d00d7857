use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{Instrument, Span, debug};

use jobgate_auth::SessionStore;

use crate::app::errors::ApiError;
use crate::context::SessionContext;

/// Where unauthenticated callers are sent.
pub const LOGIN_PATH: &str = "/login";

#[derive(Clone)]
pub struct GuardState {
    pub sessions: Arc<dyn SessionStore>,
    pub cookie_name: Arc<str>,
    pub span: Span,
}

/// Require a live session on every request passing through.
///
/// A missing, malformed or unknown cookie redirects to [`LOGIN_PATH`] and the
/// handler does not run.
pub async fn route_guard(
    State(state): State<GuardState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let span = state.span.clone();
    async move {
        let path = req.uri().path().to_string();
        let Some(raw) = extract_cookie(req.headers(), &state.cookie_name) else {
            debug!(%path, "no session cookie; redirecting to login");
            return redirect_to_login();
        };

        let session = match state.sessions.lookup(raw).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!(%path, "unknown session; redirecting to login");
                return redirect_to_login();
            }
            Err(e) => return ApiError::from(e).into_response(),
        };

        req.extensions_mut()
            .insert(SessionContext::new(session.id, session.user_id));
        next.run(req).await
    }
    .instrument(span)
    .await
}

/// `302 Found` to the login entry point.
fn redirect_to_login() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, LOGIN_PATH)]).into_response()
}

/// Value of the named cookie, if any `Cookie` header carries it.
fn extract_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(values: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for v in values {
            headers.append(header::COOKIE, HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let h = headers(&["theme=dark; jobgate-session=abc ; other=1"]);
        assert_eq!(extract_cookie(&h, "jobgate-session"), Some("abc"));
    }

    #[test]
    fn searches_every_cookie_header() {
        let h = headers(&["theme=dark", "jobgate-session=\"abc\""]);
        assert_eq!(extract_cookie(&h, "jobgate-session"), Some("abc"));
    }

    #[test]
    fn missing_cookie_is_none() {
        assert_eq!(extract_cookie(&HeaderMap::new(), "jobgate-session"), None);
        let h = headers(&["jobgate-session-old=abc; flag"]);
        assert_eq!(extract_cookie(&h, "jobgate-session"), None);
    }
}
