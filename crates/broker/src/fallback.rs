// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fallback policy consulted at delivery time: an optional external
//! collaborator that may rewrite an agent's effective communication mode
//! (e.g. forcing `headless` down to `tmux` once degradation thresholds are
//! exceeded). The delivery engine's contract is limited to honoring the
//! override decision and recording the reason when one fires.

use async_trait::async_trait;

use crate::registry::CommMode;

#[async_trait]
pub trait FallbackController: Send + Sync {
    /// Return the effective comm mode to use for this delivery, and — if it
    /// differs from `default_mode` — a human-readable reason to log.
    async fn resolve_mode(&self, agent_id: &str, default_mode: CommMode) -> (CommMode, Option<String>);
}

/// Never overrides. The conservative default when no degradation policy is
/// configured.
#[derive(Default)]
pub struct NoOpFallbackController;

#[async_trait]
impl FallbackController for NoOpFallbackController {
    async fn resolve_mode(&self, _agent_id: &str, default_mode: CommMode) -> (CommMode, Option<String>) {
        (default_mode, None)
    }
}

#[cfg(test)]
#[path = "fallback_tests.rs"]
mod tests;
