pub mod backup;
pub mod health;
pub mod notifications;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

/// Bearer-token gate for everything except `/api/health`. Open when no
/// `server.auth_token` is configured.
pub fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    token_ok(state.config.server.auth_token.as_deref(), headers)
}

fn token_ok(expected: Option<&str>, headers: &HeaderMap) -> bool {
    match expected {
        None => true,
        Some(expected) => extract_bearer(headers)
            .map(|token| token == expected)
            .unwrap_or(false),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn unauthorized() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError {
            error: "Unauthorized. Set 'Authorization: Bearer <your-token>' header.".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn open_when_no_token_is_configured() {
        assert!(token_ok(None, &HeaderMap::new()));
        assert!(token_ok(None, &headers_with("Bearer anything")));
    }

    #[test]
    fn requires_the_exact_configured_token() {
        assert!(token_ok(Some("s3cret"), &headers_with("Bearer s3cret")));
        assert!(!token_ok(Some("s3cret"), &headers_with("Bearer wrong")));
        assert!(!token_ok(Some("s3cret"), &HeaderMap::new()));
    }

    #[test]
    fn rejects_non_bearer_schemes() {
        assert!(!token_ok(Some("s3cret"), &headers_with("Basic s3cret")));
        assert!(!token_ok(Some("s3cret"), &headers_with("s3cret")));
    }
}
