// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The ticket: the correlation unit for a single delivery and its reply.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, caller-supplied metadata. Recognized keys (`threadId`, `replyTo`,
/// `isReply`, `origin`, `commMode`, `role`, `workingDirectory`) are read by
/// the core; everything else passes through unchanged.
pub type Metadata = HashMap<String, serde_json::Value>;

pub const META_THREAD_ID: &str = "threadId";
pub const META_REPLY_TO: &str = "replyTo";
pub const META_IS_REPLY: &str = "isReply";
pub const META_ORIGIN: &str = "origin";

/// Default `metadata.origin` when the caller does not supply one.
pub const DEFAULT_ORIGIN: &str = "ui";

/// Default ticket timeout, in milliseconds, when the caller does not supply one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Status transitions form a DAG: `Pending -> {Delivered, Responded, Timeout,
/// Error}`, `Delivered -> {Responded, Timeout, Error}`. `Responded`,
/// `Timeout`, and `Error` are terminal and immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Delivered,
    Responded,
    Timeout,
    Error,
}

impl TicketStatus {
    /// Terminal states are immutable once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Responded | TicketStatus::Timeout | TicketStatus::Error)
    }
}

/// The response recorded on a ticket once it reaches `Responded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
    pub at: DateTime<Utc>,
}

/// Error detail recorded on a ticket that reaches `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketError {
    pub message: String,
}

/// The correlation record for a single delivery and its eventual reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub ticket_id: Uuid,
    pub target_agent: String,
    pub origin_agent: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: Metadata,
    pub expect_reply: bool,
    pub timeout_ms: u64,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<TicketResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TicketError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters accepted by `DeliveryEngine::create`.
#[derive(Debug, Clone)]
pub struct CreateTicket {
    pub target_agent: String,
    pub origin_agent: String,
    pub payload: serde_json::Value,
    pub metadata: Metadata,
    pub expect_reply: bool,
    pub timeout_ms: Option<u64>,
}

impl Ticket {
    /// Construct a brand-new `pending` ticket from creation parameters.
    pub fn new(params: CreateTicket, now: DateTime<Utc>) -> Self {
        let mut metadata = params.metadata;
        metadata.entry(META_ORIGIN.to_owned()).or_insert_with(|| DEFAULT_ORIGIN.into());
        Self {
            ticket_id: Uuid::new_v4(),
            target_agent: params.target_agent,
            origin_agent: params.origin_agent,
            payload: params.payload,
            metadata,
            expect_reply: params.expect_reply,
            timeout_ms: params.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            status: TicketStatus::Pending,
            response: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `latencyMs` as defined in the external-interfaces contract:
    /// `response.at - createdAt`, in milliseconds. `None` unless responded.
    pub fn latency_ms(&self) -> Option<i64> {
        self.response.as_ref().map(|r| (r.at - self.created_at).num_milliseconds())
    }

    /// Whether `metadata.isReply` is set truthy.
    pub fn is_reply(&self) -> bool {
        self.metadata.get(META_IS_REPLY).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
