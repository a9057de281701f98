// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/JSON handlers realizing the external-interfaces contract: submit,
//! reply, long-poll, pending, acknowledge, heartbeat, registration,
//! bootstrap, and compaction.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::bootstrap::{BootstrapMode, BootstrapRequest};
use crate::compaction::TrackTurn;
use crate::error::ErrorCode;
use crate::registry::{AgentRecord, RegisterAgent};
use crate::ticket::{CreateTicket, Metadata, Ticket, DEFAULT_TIMEOUT_MS};
use crate::transport::state::AppState;
use crate::transport::ErrorResponse;

type AppResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

fn err_response(code: ErrorCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    let message = message.into();
    let (status, body) = code.to_http_response(message);
    (status, body)
}

/// Serialized ticket with the derived `latencyMs` the external contract
/// requires (`response.at - createdAt`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketView {
    #[serde(flatten)]
    ticket: Ticket,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<i64>,
}

impl From<Ticket> for TicketView {
    fn from(ticket: Ticket) -> Self {
        let latency_ms = ticket.latency_ms();
        Self { ticket, latency_ms }
    }
}

// -- Health --------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "running" })
}

#[derive(Serialize)]
pub struct ReadyBody {
    pub ready: bool,
}

/// Readiness: the embedded store must be reachable. Migrations already ran
/// at `Core::init` time, so a successful trivial query is sufficient.
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyBody> {
    let ready = sqlx::query("SELECT 1").execute(&state.core.pool).await.is_ok();
    Json(ReadyBody { ready })
}

// -- Tickets ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTicketBody {
    pub agent_id: String,
    #[serde(default)]
    pub origin_agent: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub expect_reply: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTicketResponse {
    pub ticket_id: Uuid,
    pub status: &'static str,
}

/// `POST /api/v1/tickets` — never validates agent existence; an unknown or
/// offline target simply leaves the ticket pending (store-and-forward).
pub async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitTicketBody>,
) -> AppResult<(StatusCode, Json<SubmitTicketResponse>)> {
    if body.agent_id.trim().is_empty() {
        return Err(err_response(ErrorCode::Validation, "agentId is required"));
    }
    let ticket = state
        .core
        .delivery
        .create(CreateTicket {
            target_agent: body.agent_id,
            origin_agent: body.origin_agent.unwrap_or_else(|| "ui".to_owned()),
            payload: body.payload,
            metadata: body.metadata,
            expect_reply: body.expect_reply.unwrap_or(true),
            timeout_ms: Some(body.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        })
        .await
        .map_err(|e| err_response(e.code, e.message))?;

    Ok((StatusCode::ACCEPTED, Json(SubmitTicketResponse { ticket_id: ticket.ticket_id, status: "pending" })))
}

/// `GET /api/v1/tickets/{id}`
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    let ticket = state
        .core
        .delivery
        .get(ticket_id)
        .await
        .ok_or_else(|| err_response(ErrorCode::NotFound, "ticket not found"))?;
    Ok(Json(ticket.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReplyBody {
    pub payload: Value,
    #[serde(default)]
    pub metadata: Metadata,
}

/// `POST /api/v1/tickets/{id}/reply` — 204 on success, 404 if unknown.
pub async fn post_reply(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<PostReplyBody>,
) -> AppResult<StatusCode> {
    let responded = state.core.delivery.respond(ticket_id, body.payload, body.metadata).await;
    if responded.is_none() {
        return Err(err_response(ErrorCode::NotFound, "ticket not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/tickets/{id}/ack` — `pending -> delivered`; idempotent.
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Json<TicketView>> {
    let ticket = state
        .core
        .delivery
        .acknowledge(ticket_id)
        .await
        .ok_or_else(|| err_response(ErrorCode::NotFound, "ticket not found"))?;
    Ok(Json(ticket.into()))
}

/// `GET /api/v1/tickets/{id}/wait` — long-poll. Races the ticket's own
/// `timeoutMs` against a waiter fulfilled by `respond`/`timeout`.
pub async fn wait_for_reply(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<Uuid>,
) -> Response {
    let Some(initial) = state.core.delivery.get(ticket_id).await else {
        return err_response(ErrorCode::NotFound, "ticket not found").into_response();
    };

    let Some(ticket) = state.core.delivery.wait_for_reply(ticket_id, initial.timeout_ms).await else {
        return err_response(ErrorCode::NotFound, "ticket not found").into_response();
    };

    if ticket.status == crate::ticket::TicketStatus::Timeout {
        return (StatusCode::REQUEST_TIMEOUT, Json(TicketView::from(ticket))).into_response();
    }
    (StatusCode::OK, Json(TicketView::from(ticket))).into_response()
}

/// `GET /api/v1/agents/{id}/pending` — ordered pending tickets for the target.
pub async fn get_pending(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Json<Vec<TicketView>> {
    let pending = state.core.delivery.get_pending(&agent_id).await;
    Json(pending.into_iter().map(TicketView::from).collect())
}

#[derive(Serialize)]
pub struct CountAllResponse {
    pub count: u64,
}

/// `GET /api/v1/tickets/count` — the explicit `countAll()` this repository
/// defines instead of overloading `getPending("*")`.
pub async fn count_all(State(state): State<Arc<AppState>>) -> AppResult<Json<CountAllResponse>> {
    let count = state.core.delivery.count_all().await.map_err(|e| err_response(e.code, e.message))?;
    Ok(Json(CountAllResponse { count }))
}

// -- Agents ------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentBody {
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u64>,
}

pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<RegisterAgentBody>,
) -> Json<AgentRecord> {
    let record = state
        .core
        .registry
        .register(
            &agent_id,
            RegisterAgent {
                agent_type: body.agent_type,
                metadata: body.metadata,
                heartbeat_interval_ms: body.heartbeat_interval_ms,
            },
        )
        .await;
    Json(record)
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<AgentRecord>> {
    let record = state
        .core
        .registry
        .get(&agent_id)
        .await
        .ok_or_else(|| err_response(ErrorCode::NotFound, "agent not found"))?;
    Ok(Json(record))
}

pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentRecord>> {
    Json(state.core.registry.list().await)
}

pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .core
        .registry
        .delete(&agent_id)
        .await
        .ok_or_else(|| err_response(ErrorCode::NotFound, "agent not found"))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/agents/{id}/heartbeat`
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> AppResult<Json<AgentRecord>> {
    let record =
        state.core.registry.touch(&agent_id).await.ok_or_else(|| err_response(ErrorCode::NotFound, "agent not found"))?;
    Ok(Json(record))
}

// -- Bootstrap -----------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapTriggerBody {
    #[serde(default)]
    pub role: String,
    pub working_dir: String,
    #[serde(flatten)]
    pub mode: BootstrapMode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapTriggerResponse {
    pub mode: String,
    pub files_loaded: Vec<String>,
    pub context_size: usize,
    pub duration_seconds: f64,
}

/// `POST /api/v1/agents/{id}/bootstrap`
pub async fn bootstrap_trigger(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<BootstrapTriggerBody>,
) -> AppResult<Json<BootstrapTriggerResponse>> {
    let mode_name = match &body.mode {
        BootstrapMode::None => "none",
        BootstrapMode::Auto { .. } => "auto",
        BootstrapMode::Manual { .. } => "manual",
        BootstrapMode::Custom { .. } => "custom",
    }
    .to_owned();

    let outcome = state
        .core
        .bootstrap
        .run(BootstrapRequest {
            agent_id,
            role: body.role,
            working_dir: body.working_dir.into(),
            mode: body.mode,
        })
        .await
        .map_err(|e| err_response(e.code, e.message))?;

    Ok(Json(BootstrapTriggerResponse {
        mode: mode_name,
        files_loaded: outcome.files_loaded,
        context_size: outcome.context_size,
        duration_seconds: outcome.duration_ms as f64 / 1000.0,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    20
}

pub async fn bootstrap_history(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<crate::bootstrap::BootstrapHistoryEntry>> {
    Json(state.core.bootstrap.history(&agent_id, query.limit).await)
}

// -- Compaction ------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompactionTrackBody {
    #[serde(default)]
    pub tokens: Option<u64>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub confusion_count: Option<u64>,
}

pub async fn compaction_track(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<CompactionTrackBody>,
) -> Json<crate::compaction::CompactionStatus> {
    let status = state
        .core
        .compaction
        .track_turn(
            &agent_id,
            TrackTurn {
                tokens: body.tokens,
                error: body.error,
                response_time: body.response_time,
                confusion_count: body.confusion_count,
            },
        )
        .await;
    Json(status)
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum CompactionStatusResponse {
    Status(crate::compaction::CompactionStatus),
    None { message: &'static str },
}

pub async fn compaction_status(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Json<CompactionStatusResponse> {
    match state.core.compaction.status(&agent_id).await {
        Some(status) => Json(CompactionStatusResponse::Status(status)),
        None => Json(CompactionStatusResponse::None { message: "no metrics available" }),
    }
}

pub async fn compaction_reset(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> StatusCode {
    state.core.compaction.reset_metrics(&agent_id).await;
    StatusCode::NO_CONTENT
}

pub async fn compaction_history(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<crate::compaction::CompactionMetric>> {
    Json(state.core.compaction.history(&agent_id, query.limit).await)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
