// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use crate::error::ErrorCode;
use crate::transport::auth::validate_bearer;

#[test]
fn no_token_configured_allows_all() {
    let headers = HeaderMap::new();
    assert!(validate_bearer(&headers, None).is_ok());
}

#[test]
fn valid_bearer_passes() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret123".parse().unwrap());
    assert!(validate_bearer(&headers, Some("secret123")).is_ok());
}

#[test]
fn invalid_bearer_rejected() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer wrong".parse().unwrap());
    assert_eq!(validate_bearer(&headers, Some("secret123")).unwrap_err(), ErrorCode::Unauthorized);
}

#[test]
fn missing_header_rejected() {
    let headers = HeaderMap::new();
    assert_eq!(validate_bearer(&headers, Some("secret123")).unwrap_err(), ErrorCode::Unauthorized);
}

#[test]
fn wrong_scheme_rejected() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());
    assert_eq!(validate_bearer(&headers, Some("secret123")).unwrap_err(), ErrorCode::Unauthorized);
}
