// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket Store & Delivery Engine — the heart of the broker. Composes the
//! Repository, Registry, and Executor to create tickets, dispatch delivery
//! by communication mode, route reverse-ticket replies, fan out long-poll
//! waiters, and retry on a busy executor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::CoreError;
use crate::executor::{AgentLocks, Executor};
use crate::fallback::FallbackController;
use crate::monitoring::{BrokerEvent, MonitoringSink};
use crate::registry::{AgentRegistry, CommMode};
use crate::repository::TicketRepository;
use crate::shadow::ShadowController;
use crate::ticket::{
    CreateTicket, Metadata, Ticket, TicketError, TicketResponse, TicketStatus, META_IS_REPLY, META_REPLY_TO,
};
use crate::waiter::WaiterRegistry;

pub struct DeliveryEngine {
    repo: Arc<dyn TicketRepository>,
    registry: Arc<AgentRegistry>,
    executor: Arc<dyn Executor>,
    locks: AgentLocks,
    waiters: WaiterRegistry,
    monitoring: Arc<MonitoringSink>,
    fallback: Arc<dyn FallbackController>,
    shadow: Option<Arc<dyn ShadowController>>,
    busy_retry: Duration,
}

impl DeliveryEngine {
    pub fn new(
        repo: Arc<dyn TicketRepository>,
        registry: Arc<AgentRegistry>,
        executor: Arc<dyn Executor>,
        monitoring: Arc<MonitoringSink>,
        fallback: Arc<dyn FallbackController>,
        shadow: Option<Arc<dyn ShadowController>>,
        busy_retry: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            registry,
            executor,
            locks: AgentLocks::new(),
            waiters: WaiterRegistry::new(),
            monitoring,
            fallback,
            shadow,
            busy_retry,
        })
    }

    /// Persist a new ticket, broadcast `message.sent`, and schedule delivery
    /// and its own timeout timer as independent background tasks. Returns
    /// immediately; delivery failures never propagate here.
    pub async fn create(self: &Arc<Self>, params: CreateTicket) -> Result<Ticket, CoreError> {
        let ticket = Ticket::new(params, Utc::now());
        self.repo.save(&ticket).await?;
        self.monitoring.publish(BrokerEvent::TicketCreated {
            ticket_id: ticket.ticket_id,
            target_agent: ticket.target_agent.clone(),
        });

        let delivery_engine = self.clone();
        let ticket_id = ticket.ticket_id;
        tokio::spawn(async move { delivery_engine.deliver_ticket(ticket_id).await });

        let timeout_engine = self.clone();
        let timeout_ms = ticket.timeout_ms;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
            timeout_engine.timeout_ticket(ticket_id).await;
        });

        Ok(ticket)
    }

    /// Delivery dispatch. A missing agent leaves the ticket `pending`
    /// (store-and-forward); a fallback controller may rewrite the effective
    /// comm mode before the branch is taken.
    async fn deliver_ticket(self: Arc<Self>, ticket_id: Uuid) {
        let Some(ticket) = self.repo.get(ticket_id).await else { return };
        if ticket.status != TicketStatus::Pending {
            return;
        }
        let Some(agent) = self.registry.get(&ticket.target_agent).await else { return };

        let (mode, reason) = self.fallback.resolve_mode(&ticket.target_agent, agent.comm_mode).await;
        if let Some(reason) = reason {
            tracing::info!(
                agent_id = %ticket.target_agent,
                %ticket_id,
                reason,
                "fallback controller overrode comm mode"
            );
        }

        match mode {
            CommMode::Headless => self.deliver_headless(ticket).await,
            CommMode::Tmux => {}
            CommMode::Shadow => self.deliver_shadow(ticket).await,
        }
    }

    async fn deliver_headless(self: Arc<Self>, ticket: Ticket) {
        let Some(guard) = self.locks.try_acquire(&ticket.target_agent).await else {
            let retry_engine = self.clone();
            let ticket_id = ticket.ticket_id;
            let delay = self.busy_retry;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(t) = retry_engine.repo.get(ticket_id).await {
                    if t.status == TicketStatus::Pending {
                        retry_engine.deliver_ticket(ticket_id).await;
                    }
                }
            });
            return;
        };

        let started = Instant::now();
        let result = self.executor.execute(&ticket.target_agent, &ticket).await;
        drop(guard);

        self.monitoring.publish(BrokerEvent::TicketDelivered {
            ticket_id: ticket.ticket_id,
            target_agent: ticket.target_agent.clone(),
            mode: "headless".to_owned(),
        });

        match result {
            Ok(payload) => {
                let mut metadata = Metadata::new();
                metadata.insert("durationMs".to_owned(), json!(started.elapsed().as_millis() as u64));
                metadata.insert("success".to_owned(), json!(true));
                self.respond(ticket.ticket_id, payload, metadata).await;
            }
            Err(err) => {
                self.monitoring
                    .publish(BrokerEvent::TicketErrored { ticket_id: ticket.ticket_id, message: err.message.clone() });
                let _ = self
                    .repo
                    .update_status(
                        ticket.ticket_id,
                        TicketStatus::Error,
                        None,
                        Some(TicketError { message: err.message }),
                    )
                    .await;
                if let Some(updated) = self.repo.get(ticket.ticket_id).await {
                    self.waiters.fulfill(&updated).await;
                }
            }
        }
    }

    /// Tmux remains the primary (canonical) path: the ticket stays pending
    /// for manual pickup. The headless executor runs in parallel purely for
    /// comparison via the shadow controller, if one is configured.
    async fn deliver_shadow(self: Arc<Self>, ticket: Ticket) {
        self.monitoring.publish(BrokerEvent::TicketDelivered {
            ticket_id: ticket.ticket_id,
            target_agent: ticket.target_agent.clone(),
            mode: "shadow".to_owned(),
        });
        if let Some(shadow) = self.shadow.clone() {
            let target = ticket.target_agent.clone();
            tokio::spawn(async move { shadow.run_shadow(&target, &ticket).await });
        }
    }

    /// Finalize a ticket with a response, route the reverse ticket (or
    /// fire-and-forget execute the reply against a headless origin), and
    /// wake every waiter. A no-op on an already-terminal or unknown ticket.
    pub async fn respond(self: &Arc<Self>, ticket_id: Uuid, payload: Value, metadata: Metadata) -> Option<Ticket> {
        let ticket = self.repo.get(ticket_id).await?;
        if ticket.status.is_terminal() {
            return Some(ticket);
        }

        let response = TicketResponse { payload: payload.clone(), metadata: metadata.clone(), at: Utc::now() };
        if let Err(err) =
            self.repo.update_status(ticket_id, TicketStatus::Responded, Some(response.clone()), None).await
        {
            tracing::error!(error = %err, %ticket_id, "failed to persist ticket response");
        }

        let updated = match self.repo.get(ticket_id).await {
            Some(t) => t,
            None => return None,
        };
        self.monitoring.publish(BrokerEvent::TicketResponded { ticket_id });

        if !updated.is_reply() {
            self.route_reverse(&updated, &response).await;
        }

        self.waiters.fulfill(&updated).await;
        Some(updated)
    }

    async fn route_reverse(self: &Arc<Self>, ticket: &Ticket, response: &TicketResponse) {
        let Some(origin) = self.registry.get(&ticket.origin_agent).await else { return };

        if origin.comm_mode == CommMode::Headless {
            let executor = self.executor.clone();
            let origin_id = ticket.origin_agent.clone();
            let mut reply_meta = Metadata::new();
            reply_meta.insert(META_IS_REPLY.to_owned(), json!(true));
            reply_meta.insert(META_REPLY_TO.to_owned(), json!(ticket.ticket_id.to_string()));
            let probe = Ticket::new(
                CreateTicket {
                    target_agent: origin_id.clone(),
                    origin_agent: ticket.target_agent.clone(),
                    payload: response.payload.clone(),
                    metadata: reply_meta,
                    expect_reply: false,
                    timeout_ms: None,
                },
                Utc::now(),
            );
            tokio::spawn(async move {
                if let Err(err) = executor.execute(&origin_id, &probe).await {
                    tracing::warn!(error = %err, %origin_id, "fire-and-forget reply execution failed");
                }
            });
        } else {
            let mut reverse_meta = Metadata::new();
            reverse_meta.insert(META_REPLY_TO.to_owned(), json!(ticket.ticket_id.to_string()));
            reverse_meta.insert(META_IS_REPLY.to_owned(), json!(true));
            let reverse = CreateTicket {
                target_agent: ticket.origin_agent.clone(),
                origin_agent: ticket.target_agent.clone(),
                payload: response.payload.clone(),
                metadata: reverse_meta,
                expect_reply: false,
                timeout_ms: None,
            };
            if let Err(err) = self.create(reverse).await {
                tracing::warn!(error = %err, "failed to create reverse ticket");
            }
        }
    }

    /// `pending -> delivered` only; idempotent no-op otherwise.
    pub async fn acknowledge(&self, ticket_id: Uuid) -> Option<Ticket> {
        let ticket = self.repo.get(ticket_id).await?;
        if ticket.status != TicketStatus::Pending {
            return Some(ticket);
        }
        self.repo.update_status(ticket_id, TicketStatus::Delivered, None, None).await.ok()?;
        self.repo.get(ticket_id).await
    }

    /// `pending -> timeout`; no-op on a non-pending ticket.
    pub async fn timeout_ticket(&self, ticket_id: Uuid) -> Option<Ticket> {
        let ticket = self.repo.get(ticket_id).await?;
        if ticket.status != TicketStatus::Pending {
            return None;
        }
        self.repo.update_status(ticket_id, TicketStatus::Timeout, None, None).await.ok()?;
        let updated = self.repo.get(ticket_id).await?;
        self.monitoring.publish(BrokerEvent::TicketTimedOut { ticket_id });
        self.waiters.fulfill(&updated).await;
        Some(updated)
    }

    /// Long-poll: returns immediately if the ticket is already terminal
    /// (checked before registering a waiter, per the tie-break rule), races
    /// the waiter against `timeout_ms`, and re-checks for a terminal state
    /// that landed between the initial read and registration.
    pub async fn wait_for_reply(&self, ticket_id: Uuid, timeout_ms: u64) -> Option<Ticket> {
        let ticket = self.repo.get(ticket_id).await?;
        if ticket.status.is_terminal() {
            return Some(ticket);
        }

        let (handle, rx) = self.waiters.register(ticket_id).await;
        if let Some(t) = self.repo.get(ticket_id).await {
            if t.status.is_terminal() {
                self.waiters.cancel(&handle).await;
                return Some(t);
            }
        }

        tokio::select! {
            result = rx => result.ok(),
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                self.waiters.cancel(&handle).await;
                self.timeout_ticket(ticket_id).await;
                self.repo.get(ticket_id).await
            }
        }
    }

    pub async fn get(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.repo.get(ticket_id).await
    }

    pub async fn get_pending(&self, target_agent: &str) -> Vec<Ticket> {
        self.repo.get_pending(target_agent).await
    }

    pub async fn count_all(&self) -> Result<u64, CoreError> {
        self.repo.count_all().await
    }

    /// Periodic sweep removing terminal tickets past the retention window.
    pub fn spawn_cleanup_sweep(self: &Arc<Self>, interval: Duration, max_age_ms: i64, shutdown: CancellationToken) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.repo.cleanup(max_age_ms).await {
                            Ok(0) => {}
                            Ok(count) => tracing::info!(count, "cleaned up terminal tickets"),
                            Err(err) => tracing::warn!(error = %err, "ticket cleanup failed"),
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("ticket cleanup sweep shutting down");
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
