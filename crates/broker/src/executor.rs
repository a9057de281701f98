// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Headless execution: runs a ticket's payload through an agent's configured
//! command and returns its reply. Tmux/store-and-forward delivery never goes
//! through an `Executor` — it is satisfied entirely by the Agent Registry's
//! pending queue and the agent's own `GetPending`/`Respond` polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{CoreError, ErrorCode};
use crate::ticket::Ticket;

/// Runs one ticket against one agent and returns its reply payload.
/// Implementations must not block the calling task — spawn subprocesses or
/// make network calls as appropriate.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, agent_id: &str, ticket: &Ticket) -> Result<Value, CoreError>;
}

#[async_trait]
impl Executor for Arc<dyn Executor> {
    async fn execute(&self, agent_id: &str, ticket: &Ticket) -> Result<Value, CoreError> {
        (**self).execute(agent_id, ticket).await
    }
}

/// Spawns the agent's configured shell command, feeds it the ticket payload
/// on stdin as JSON, and parses its stdout as the reply payload (falling
/// back to a `{"raw": "..."}` wrapper for non-JSON output).
pub struct LocalProcessExecutor {
    /// `agent_type -> shell command template`. The command receives the
    /// ticket payload on stdin.
    commands: HashMap<String, String>,
    timeout: Duration,
}

impl LocalProcessExecutor {
    pub fn new(commands: HashMap<String, String>, timeout: Duration) -> Self {
        Self { commands, timeout }
    }
}

#[async_trait]
impl Executor for LocalProcessExecutor {
    async fn execute(&self, agent_id: &str, ticket: &Ticket) -> Result<Value, CoreError> {
        let command = self.commands.get(&ticket.target_agent).or_else(|| self.commands.get("default")).ok_or_else(
            || CoreError::new(ErrorCode::ExecutorFail, format!("no command configured for agent {agent_id}")),
        )?;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("AGENT_ID", agent_id)
            .env("TICKET_ID", ticket.ticket_id.to_string())
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::new(ErrorCode::ExecutorFail, format!("spawn failed: {e}")))?;

        {
            use tokio::io::AsyncWriteExt;
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| CoreError::new(ErrorCode::ExecutorFail, "child stdin unavailable"))?;
            let payload = serde_json::to_vec(&ticket.payload)
                .map_err(|e| CoreError::new(ErrorCode::ExecutorFail, e.to_string()))?;
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| CoreError::new(ErrorCode::ExecutorFail, e.to_string()))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CoreError::new(ErrorCode::Timeout, "agent execution timed out"))?
            .map_err(|e| CoreError::new(ErrorCode::ExecutorFail, e.to_string()))?;

        if !output.status.success() {
            return Err(CoreError::new(ErrorCode::ExecutorFail, format!("agent exited with {}", output.status)));
        }

        match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(String::from_utf8_lossy(&output.stdout).into_owned())),
        }
    }
}

/// Per-agent serialization lock: converts concurrent deliveries to the same
/// agent into back-pressure rather than interleaved execution. Modeled on
/// the request/response debounce pattern used for terminal input delivery —
/// one slot held for the duration of a delivery, contenders told to retry.
#[derive(Default)]
pub struct AgentLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one delivery. Dropping releases the slot.
pub struct DeliveryGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl AgentLocks {
    pub fn new() -> Self {
        Self { locks: Mutex::new(HashMap::new()) }
    }

    /// Attempt to acquire the agent's delivery slot without waiting. `None`
    /// means another delivery is already in flight — the caller should
    /// surface `ExecutorBusy` and retry later.
    pub async fn try_acquire(&self, agent_id: &str) -> Option<DeliveryGuard> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            locks.entry(agent_id.to_owned()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        mutex.try_lock_owned().ok().map(|permit| DeliveryGuard { _permit: permit })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
