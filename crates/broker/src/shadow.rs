// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shadow mode: for agents whose `commMode` is `Shadow`, the tmux/
//! store-and-forward path is canonical — the ticket stays `pending` for a
//! terminal-attached consumer exactly as in plain `tmux` mode — while the
//! headless executor is run in parallel purely for comparison. The shadow
//! run's outcome never affects the ticket; it is recorded for observation
//! only.

use std::time::Instant;

use async_trait::async_trait;

use crate::executor::Executor;
use crate::ticket::Ticket;

#[async_trait]
pub trait ShadowController: Send + Sync {
    /// Run the secondary (headless) path for a ticket whose primary path is
    /// tmux/store-and-forward. Must never mutate the ticket or respond it.
    async fn run_shadow(&self, agent_id: &str, ticket: &Ticket);
}

/// Runs the configured `Executor` against the ticket and logs the
/// comparison outcome, swallowing any failure.
pub struct ExecutorShadowController<E> {
    executor: E,
}

impl<E> ExecutorShadowController<E>
where
    E: Executor,
{
    pub fn new(executor: E) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl<E> ShadowController for ExecutorShadowController<E>
where
    E: Executor,
{
    async fn run_shadow(&self, agent_id: &str, ticket: &Ticket) {
        let started = Instant::now();
        match self.executor.execute(agent_id, ticket).await {
            Ok(result) => tracing::info!(
                ticket_id = %ticket.ticket_id,
                duration_ms = started.elapsed().as_millis() as u64,
                result = ?result,
                "shadow (headless) comparison succeeded"
            ),
            Err(err) => tracing::warn!(
                ticket_id = %ticket.ticket_id,
                error = %err,
                "shadow (headless) comparison failed, primary tmux delivery unaffected"
            ),
        }
    }
}

#[cfg(test)]
#[path = "shadow_tests.rs"]
mod tests;
