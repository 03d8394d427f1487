// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorCode;
use crate::state::AppState;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ErrorCode::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Validate the `x-api-key` header the issuing agent attaches to webhooks.
pub fn validate_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(key) if constant_time_eq(key, expected) => Ok(()),
        _ => Err(ErrorCode::Unauthorized),
    }
}

/// Validate a token passed as the `token` query parameter of a WebSocket upgrade.
pub fn validate_ws_token(token: Option<&str>, expected: Option<&str>) -> Result<(), ErrorCode> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match token {
        Some(token) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(ErrorCode::Unauthorized),
    }
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/v1/health`, the relay socket (`/ws`, query token) and agent
/// webhooks (`/webhooks/`, `x-api-key`).
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if path == "/api/v1/health" || path == "/ws" {
        return next.run(req).await;
    }

    let result = if path.starts_with("/webhooks/") {
        validate_api_key(req.headers(), state.config.webhook_api_key.as_deref())
    } else {
        validate_bearer(req.headers(), state.config.auth_token.as_deref())
    };
    if let Err(code) = result {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[yare::parameterized(
        disabled = { None, None, true },
        matching = { Some("Bearer secret"), Some("secret"), true },
        wrong = { Some("Bearer nope"), Some("secret"), false },
        no_prefix = { Some("secret"), Some("secret"), false },
        missing = { None, Some("secret"), false },
    )]
    fn bearer(header: Option<&'static str>, expected: Option<&str>, ok: bool) {
        let map = header.map(|h| headers("authorization", h)).unwrap_or_default();
        assert_eq!(validate_bearer(&map, expected).is_ok(), ok);
    }

    #[test]
    fn api_key_checks_header() {
        assert!(validate_api_key(&headers("x-api-key", "k"), Some("k")).is_ok());
        assert_eq!(
            validate_api_key(&headers("x-api-key", "other"), Some("k")),
            Err(ErrorCode::Unauthorized)
        );
        assert!(validate_api_key(&HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn ws_token() {
        assert!(validate_ws_token(Some("t"), Some("t")).is_ok());
        assert!(validate_ws_token(None, Some("t")).is_err());
        assert!(validate_ws_token(None, None).is_ok());
    }
}
