// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability sink for broker-level events. Fans every event out to a
//! broadcast channel for in-process subscribers (e.g. an admin endpoint)
//! and always logs a structured tracing event first — the log is the
//! durable record, the channel is best-effort for live observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A single observable occurrence in the broker's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerEvent {
    TicketCreated { ticket_id: Uuid, target_agent: String },
    TicketDelivered { ticket_id: Uuid, target_agent: String, mode: String },
    TicketResponded { ticket_id: Uuid },
    TicketTimedOut { ticket_id: Uuid },
    TicketErrored { ticket_id: Uuid, message: String },
    AgentRegistered { agent_id: String, agent_type: String },
    AgentStatusChanged { agent_id: String, status: String },
    AgentOffline { agent_id: String },
    BootstrapStarted { agent_id: String, mode: String },
    BootstrapCompleted { agent_id: String, success: bool },
    CompactionSeverityChanged { agent_id: String, severity: String },
}

/// An emitted event with its server-assigned timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: BrokerEvent,
}

/// In-process fan-out sink. Subscribers that fall behind silently miss
/// events (lagged receivers skip ahead) rather than blocking publishers.
pub struct MonitoringSink {
    sender: broadcast::Sender<TimestampedEvent>,
}

impl Default for MonitoringSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MonitoringSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.sender.subscribe()
    }

    /// Log the event at a severity appropriate to its kind, then publish it
    /// to any live subscribers. Never fails: an event with no subscribers is
    /// simply dropped.
    pub fn publish(&self, event: BrokerEvent) {
        match &event {
            BrokerEvent::TicketErrored { message, .. } => {
                tracing::warn!(message, "ticket errored")
            }
            BrokerEvent::TicketTimedOut { ticket_id } => {
                tracing::warn!(%ticket_id, "ticket timed out")
            }
            BrokerEvent::AgentOffline { agent_id } => {
                tracing::warn!(%agent_id, "agent went offline")
            }
            BrokerEvent::BootstrapCompleted { agent_id, success: false } => {
                tracing::error!(%agent_id, "bootstrap failed")
            }
            BrokerEvent::CompactionSeverityChanged { agent_id, severity } => {
                tracing::info!(%agent_id, severity, "compaction severity changed")
            }
            _ => tracing::debug!(?event, "broker event"),
        }
        let _ = self.sender.send(TimestampedEvent { at: Utc::now(), event });
    }
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
