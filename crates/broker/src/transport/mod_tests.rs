// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use clap::Parser;
use tower::ServiceExt;

use crate::config::Config;
use crate::core::Core;
use crate::error::ErrorCode;
use crate::transport::{build_health_router, build_router, state::AppState};

async fn test_state() -> std::sync::Arc<AppState> {
    let config = Config::parse_from(["fleetbrokerd", "--db-path", ":memory:"]);
    let core = Core::init(config).await.unwrap();
    AppState::new(core)
}

#[tokio::test]
async fn error_body_round_trips_through_to_http_response() {
    let (status, body) = ErrorCode::NotFound.to_http_response("ticket not found");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.error.code, "not-found");
    assert_eq!(body.error.message, "ticket not found");
}

#[tokio::test]
async fn router_exposes_every_documented_route() {
    let state = test_state().await;
    let router = build_router(state);

    let resp = router
        .clone()
        .oneshot(Request::builder().method("GET").uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(Request::builder().method("GET").uri("/api/v1/unknown-route").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_router_serves_health_and_ready_only() {
    let state = test_state().await;
    let router = build_health_router(state);

    let resp = router
        .clone()
        .oneshot(Request::builder().method("GET").uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .clone()
        .oneshot(Request::builder().method("GET").uri("/api/v1/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = router
        .oneshot(Request::builder().method("GET").uri("/api/v1/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cors_layer_sets_permissive_header() {
    let state = test_state().await;
    let router = build_router(state);

    let resp = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/health")
                .header("origin", "http://localhost:9999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("access-control-allow-origin").is_some());
    let _ = to_bytes(resp.into_body(), 1024).await.unwrap();
}
