// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide mapping from `agentId` to Agent Record, with liveness
//! tracking and a race-free lifecycle state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::ticket::Metadata;

/// Known-headless CLI kinds. Any other `type` defaults to `tmux`.
const HEADLESS_TYPES: &[&str] = &["claude-code", "codex", "gemini"];

/// An agent's delivery transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommMode {
    Headless,
    Tmux,
    Shadow,
}

impl CommMode {
    /// Default `commMode` derived from an agent's `type`.
    pub fn default_for_type(agent_type: &str) -> Self {
        if HEADLESS_TYPES.contains(&agent_type) {
            CommMode::Headless
        } else {
            CommMode::Tmux
        }
    }

    fn from_metadata(value: &serde_json::Value) -> Option<Self> {
        match value.as_str()? {
            "headless" => Some(CommMode::Headless),
            "tmux" => Some(CommMode::Tmux),
            "shadow" => Some(CommMode::Shadow),
            _ => None,
        }
    }
}

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Starting,
    Ready,
    Busy,
    Error,
    Offline,
}

/// Bootstrap status, set by the Bootstrap Orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Ready,
}

/// Parameters accepted by `AgentRegistry::register`.
#[derive(Debug, Clone, Default)]
pub struct RegisterAgent {
    pub agent_type: String,
    pub metadata: Metadata,
    pub heartbeat_interval_ms: Option<u64>,
}

/// In-memory liveness record for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub agent_id: String,
    pub agent_type: String,
    pub metadata: Metadata,
    pub comm_mode: CommMode,
    pub status: AgentStatus,
    pub bootstrap_status: BootstrapStatus,
    #[serde(skip, default = "Instant::now")]
    pub last_heartbeat: Instant,
    pub heartbeat_interval_ms: u64,
}

impl AgentRecord {
    /// Whether this record should be treated as `offline` given the current
    /// time: no heartbeat for longer than `2 * heartbeatIntervalMs`.
    pub fn is_stale(&self) -> bool {
        self.last_heartbeat.elapsed() > Duration::from_millis(self.heartbeat_interval_ms * 2)
    }
}

/// Process-wide agent registry. Single-writer discipline is enforced by
/// routing every mutation through `&self` methods that take the write lock.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentRecord>>,
    default_heartbeat_interval_ms: u64,
}

impl AgentRegistry {
    pub fn new(default_heartbeat_interval_ms: u64) -> Self {
        Self { agents: RwLock::new(HashMap::new()), default_heartbeat_interval_ms }
    }

    /// Create or update a record. Sets `status = starting` on first
    /// registration; re-registration keeps the current lifecycle status but
    /// refreshes type/metadata/heartbeat interval and `comm_mode`.
    pub async fn register(&self, agent_id: &str, params: RegisterAgent) -> AgentRecord {
        let comm_mode = params
            .metadata
            .get("commMode")
            .and_then(CommMode::from_metadata)
            .unwrap_or_else(|| CommMode::default_for_type(&params.agent_type));
        let heartbeat_interval_ms =
            params.heartbeat_interval_ms.unwrap_or(self.default_heartbeat_interval_ms);

        let mut agents = self.agents.write().await;
        let record = agents
            .entry(agent_id.to_owned())
            .and_modify(|r| {
                r.agent_type = params.agent_type.clone();
                r.metadata = params.metadata.clone();
                r.comm_mode = comm_mode;
                r.heartbeat_interval_ms = heartbeat_interval_ms;
                r.last_heartbeat = Instant::now();
                if r.status == AgentStatus::Offline {
                    r.status = AgentStatus::Starting;
                }
            })
            .or_insert_with(|| AgentRecord {
                agent_id: agent_id.to_owned(),
                agent_type: params.agent_type,
                metadata: params.metadata,
                comm_mode,
                status: AgentStatus::Starting,
                bootstrap_status: BootstrapStatus::Pending,
                last_heartbeat: Instant::now(),
                heartbeat_interval_ms,
            });
        record.clone()
    }

    /// Bump `lastHeartbeat`; flip `offline` back to `ready` (the agent has
    /// resumed reporting liveness).
    pub async fn touch(&self, agent_id: &str) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let record = agents.get_mut(agent_id)?;
        record.last_heartbeat = Instant::now();
        if record.status == AgentStatus::Offline {
            record.status = AgentStatus::Ready;
        }
        Some(record.clone())
    }

    /// The sole entry point for lifecycle transitions. Idempotent by target
    /// state: repeated transitions to the same state are no-ops.
    pub async fn update_status(&self, agent_id: &str, status: AgentStatus) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let record = agents.get_mut(agent_id)?;
        if record.status != status {
            record.status = status;
        }
        Some(record.clone())
    }

    pub async fn update_bootstrap_status(
        &self,
        agent_id: &str,
        status: BootstrapStatus,
    ) -> Option<AgentRecord> {
        let mut agents = self.agents.write().await;
        let record = agents.get_mut(agent_id)?;
        record.bootstrap_status = status;
        Some(record.clone())
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// All registered records. Agents stale beyond their heartbeat window
    /// are reported as `offline` without mutating the stored record; the
    /// heartbeat sweep task is responsible for committing that transition.
    pub async fn list(&self) -> Vec<AgentRecord> {
        self.agents
            .read()
            .await
            .values()
            .map(|r| {
                let mut r = r.clone();
                if r.is_stale() {
                    r.status = AgentStatus::Offline;
                }
                r
            })
            .collect()
    }

    pub async fn delete(&self, agent_id: &str) -> Option<AgentRecord> {
        self.agents.write().await.remove(agent_id)
    }

    /// Spawn a background loop that marks stale agents `offline`. Runs until
    /// `shutdown` is cancelled.
    pub fn spawn_heartbeat_sweep(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let mut agents = registry.agents.write().await;
                for record in agents.values_mut() {
                    if record.is_stale() && record.status != AgentStatus::Offline {
                        tracing::info!(agent_id = %record.agent_id, "agent marked offline (missed heartbeats)");
                        record.status = AgentStatus::Offline;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
