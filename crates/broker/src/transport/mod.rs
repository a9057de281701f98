// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: route wiring, bearer-token auth, and the error envelope
//! shared by every handler.

pub mod auth;
pub mod http;
pub mod state;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::ErrorCode;
use crate::transport::state::AppState;

/// Top-level error response envelope for every HTTP handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body containing a machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorCode {
    /// Convert this error code into a transport [`ErrorBody`].
    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    /// Convert this error code into an axum JSON error response.
    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

/// Build the axum `Router` with every route in the external-interfaces
/// contract, bearer-auth middleware, and a permissive CORS layer.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/ready", get(http::ready))
        .route("/api/v1/tickets", post(http::submit_ticket))
        .route("/api/v1/tickets/count", get(http::count_all))
        .route("/api/v1/tickets/{id}", get(http::get_ticket))
        .route("/api/v1/tickets/{id}/reply", post(http::post_reply))
        .route("/api/v1/tickets/{id}/ack", post(http::acknowledge))
        .route("/api/v1/tickets/{id}/wait", get(http::wait_for_reply))
        .route("/api/v1/agents", get(http::list_agents))
        .route("/api/v1/agents/{id}", get(http::get_agent).put(http::register_agent).delete(http::delete_agent))
        .route("/api/v1/agents/{id}/pending", get(http::get_pending))
        .route("/api/v1/agents/{id}/heartbeat", post(http::heartbeat))
        .route("/api/v1/agents/{id}/bootstrap", post(http::bootstrap_trigger))
        .route("/api/v1/agents/{id}/bootstrap/history", get(http::bootstrap_history))
        .route("/api/v1/agents/{id}/compaction/track", post(http::compaction_track))
        .route("/api/v1/agents/{id}/compaction/status", get(http::compaction_status))
        .route("/api/v1/agents/{id}/compaction/reset", post(http::compaction_reset))
        .route("/api/v1/agents/{id}/compaction/history", get(http::compaction_history))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build a minimal health-only router, for a separate liveness probe port.
pub fn build_health_router(state: Arc<AppState>) -> Router {
    Router::new().route("/api/v1/health", get(http::health)).route("/api/v1/ready", get(http::ready)).with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
