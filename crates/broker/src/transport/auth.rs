// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token authentication for the HTTP transport boundary.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ErrorCode;
use crate::transport::state::AppState;
use crate::transport::ErrorResponse;

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
///
/// Returns `Ok(())` when `expected` is `None` (auth disabled) or when the
/// header matches. Returns `Err(ErrorCode::Unauthorized)` otherwise.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorCode::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::Unauthorized)
    }
}

/// Axum middleware enforcing Bearer token authentication on every route
/// except `/api/v1/health`, so an orchestrator can probe liveness without a
/// credential. When `auth_token` is unset in `Config`, all requests pass.
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/v1/health" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.auth_token()) {
        let body = ErrorResponse { error: code.to_error_body("unauthorized") };
        return (
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            axum::Json(body),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
