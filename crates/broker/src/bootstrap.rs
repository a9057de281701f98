// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap Orchestrator: runs one of four context-loading strategies on
//! agent start and records an append-only audit trail.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::error::{CoreError, ErrorCode};
use crate::file_loader::FileLoader;
use crate::registry::{AgentRegistry, BootstrapStatus};

/// Commands matching any of these substrings are refused outright.
const DENY_SUBSTRINGS: &[&str] =
    &["rm -rf", "rm -fr", "sudo", "mkfs", "dd if=", "> /dev/", "wget", "curl http", "`"];

fn system_path_redirect_pattern() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r">\s*/(dev|etc|sys|proc)/").unwrap()
}

fn command_substitution_pattern() -> Regex {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\$\(").unwrap()
}

/// Screen a `custom` bootstrap command against the deny-list. Any match
/// fails with `bootstrap-unsafe`.
pub fn screen_command(command: &str) -> Result<(), CoreError> {
    for needle in DENY_SUBSTRINGS {
        if command.contains(needle) {
            return Err(CoreError::new(
                ErrorCode::BootstrapUnsafe,
                format!("command matched deny-list pattern '{needle}'"),
            ));
        }
    }
    if system_path_redirect_pattern().is_match(command) {
        return Err(CoreError::new(
            ErrorCode::BootstrapUnsafe,
            "command redirects into a system path",
        ));
    }
    if command_substitution_pattern().is_match(command) {
        return Err(CoreError::new(ErrorCode::BootstrapUnsafe, "command uses command substitution"));
    }
    Ok(())
}

/// Which of the four bootstrap strategies to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BootstrapMode {
    None,
    Auto {
        /// Ordered list of default paths, e.g. a root context file followed
        /// by under-directory context files.
        paths: Vec<String>,
    },
    Manual {
        files: Vec<String>,
        #[serde(default)]
        additional_context: Option<String>,
    },
    Custom {
        command: String,
        #[serde(default)]
        bootstrap_env: HashMap<String, String>,
    },
}

/// Input to `BootstrapOrchestrator::run`.
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub agent_id: String,
    pub role: String,
    pub working_dir: std::path::PathBuf,
    pub mode: BootstrapMode,
}

/// Output of a successful bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapOutcome {
    pub files_loaded: Vec<String>,
    pub context_size: usize,
    pub duration_ms: u64,
}

/// One audit row. Append-only; never mutated after the completion record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapHistoryEntry {
    pub id: Uuid,
    pub agent_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub files_loaded: Vec<String>,
    pub context_size: i64,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

/// Append-only store for `BootstrapHistoryEntry` rows, backed by the shared
/// embedded relational store.
#[derive(Clone)]
pub struct BootstrapHistoryStore {
    pool: SqlitePool,
}

impl BootstrapHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bootstrap_history (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                success INTEGER,
                files_loaded TEXT NOT NULL,
                context_size INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn start(&self, agent_id: &str, mode: &str) -> Result<Uuid, CoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO bootstrap_history (id, agent_id, mode, started_at, files_loaded, context_size, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, '[]', 0, 0)",
        )
        .bind(id.to_string())
        .bind(agent_id)
        .bind(mode)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        Ok(id)
    }

    async fn complete(
        &self,
        id: Uuid,
        success: bool,
        files_loaded: &[String],
        context_size: usize,
        duration_ms: u64,
        error_message: Option<&str>,
    ) -> Result<(), CoreError> {
        let files_json =
            serde_json::to_string(files_loaded).map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        sqlx::query(
            "UPDATE bootstrap_history SET completed_at = ?1, success = ?2, files_loaded = ?3, \
             context_size = ?4, duration_ms = ?5, error_message = ?6 WHERE id = ?7",
        )
        .bind(Utc::now())
        .bind(success as i64)
        .bind(files_json)
        .bind(context_size as i64)
        .bind(duration_ms as i64)
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        Ok(())
    }

    /// The last `limit` rows for an agent, newest first.
    pub async fn history(&self, agent_id: &str, limit: u32) -> Vec<BootstrapHistoryEntry> {
        let rows = sqlx::query(
            "SELECT * FROM bootstrap_history WHERE agent_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();

        rows.iter()
            .filter_map(|row| {
                let files_loaded: String = row.try_get("files_loaded").ok()?;
                let files_loaded = serde_json::from_str(&files_loaded).unwrap_or_default();
                Some(BootstrapHistoryEntry {
                    id: row.try_get::<String, _>("id").ok()?.parse().ok()?,
                    agent_id: row.try_get("agent_id").ok()?,
                    mode: row.try_get("mode").ok()?,
                    started_at: row.try_get("started_at").ok()?,
                    completed_at: row.try_get("completed_at").ok(),
                    success: row.try_get::<Option<i64>, _>("success").ok().flatten().map(|v| v != 0),
                    files_loaded,
                    context_size: row.try_get("context_size").ok()?,
                    duration_ms: row.try_get("duration_ms").ok()?,
                    error_message: row.try_get("error_message").ok(),
                })
            })
            .collect()
    }
}

/// Runs one bootstrap strategy per `start` command and records history.
pub struct BootstrapOrchestrator {
    history: BootstrapHistoryStore,
    registry: std::sync::Arc<AgentRegistry>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl BootstrapOrchestrator {
    pub fn new(
        history: BootstrapHistoryStore,
        registry: std::sync::Arc<AgentRegistry>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self { history, registry, timeout, max_output_bytes }
    }

    fn mode_name(mode: &BootstrapMode) -> &'static str {
        match mode {
            BootstrapMode::None => "none",
            BootstrapMode::Auto { .. } => "auto",
            BootstrapMode::Manual { .. } => "manual",
            BootstrapMode::Custom { .. } => "custom",
        }
    }

    /// Run the requested mode, recording a history entry at start and at
    /// completion (success or failure). On success, context is persisted
    /// into the agent's `bootstrap_status = ready`; on failure, it becomes
    /// `failed` and the error propagates to the caller.
    pub async fn run(&self, req: BootstrapRequest) -> Result<BootstrapOutcome, CoreError> {
        self.registry
            .update_bootstrap_status(&req.agent_id, BootstrapStatus::InProgress)
            .await;

        let mode_name = Self::mode_name(&req.mode);
        let history_id = self.history.start(&req.agent_id, mode_name).await?;
        let started = std::time::Instant::now();

        let result = self.execute_mode(&req).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => {
                self.history
                    .complete(history_id, true, &outcome.files_loaded, outcome.context_size, duration_ms, None)
                    .await?;
                self.registry
                    .update_bootstrap_status(&req.agent_id, BootstrapStatus::Ready)
                    .await;
            }
            Err(err) => {
                self.history
                    .complete(history_id, false, &[], 0, duration_ms, Some(&err.message))
                    .await?;
                self.registry
                    .update_bootstrap_status(&req.agent_id, BootstrapStatus::Failed)
                    .await;
            }
        }
        result
    }

    /// The last `limit` history rows for an agent, newest first.
    pub async fn history(&self, agent_id: &str, limit: u32) -> Vec<BootstrapHistoryEntry> {
        self.history.history(agent_id, limit).await
    }

    async fn execute_mode(&self, req: &BootstrapRequest) -> Result<BootstrapOutcome, CoreError> {
        match &req.mode {
            BootstrapMode::None => Ok(BootstrapOutcome { files_loaded: vec![], context_size: 0, duration_ms: 0 }),
            BootstrapMode::Auto { paths } => {
                let loader = FileLoader::new(&req.working_dir);
                let loaded = loader.load_auto_files(paths)?;
                let context = join_with_headers(&loaded);
                Ok(BootstrapOutcome {
                    files_loaded: loaded.into_iter().map(|f| f.path).collect(),
                    context_size: context.len(),
                    duration_ms: 0,
                })
            }
            BootstrapMode::Manual { files, additional_context } => {
                let loader = FileLoader::new(&req.working_dir);
                let mut loaded = Vec::new();
                for path in files {
                    let file = loader.load_file(path)?;
                    if file.loaded {
                        loaded.push(file);
                    }
                }
                let mut context = join_with_headers(&loaded);
                if let Some(extra) = additional_context {
                    context.push_str("\n\n--- additional context ---\n");
                    context.push_str(extra);
                }
                Ok(BootstrapOutcome {
                    files_loaded: loaded.into_iter().map(|f| f.path).collect(),
                    context_size: context.len(),
                    duration_ms: 0,
                })
            }
            BootstrapMode::Custom { command, bootstrap_env } => {
                screen_command(command)?;
                self.run_custom_script(req, command, bootstrap_env).await
            }
        }
    }

    async fn run_custom_script(
        &self,
        req: &BootstrapRequest,
        command: &str,
        bootstrap_env: &HashMap<String, String>,
    ) -> Result<BootstrapOutcome, CoreError> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&req.working_dir)
            .env("AGENT_ID", &req.agent_id)
            .env("AGENT_ROLE", &req.role)
            .env("WORKING_DIR", &req.working_dir)
            .envs(bootstrap_env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| CoreError::new(ErrorCode::BootstrapFail, format!("failed to spawn: {e}")))?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::new(ErrorCode::BootstrapFail, "script stdout was not piped"))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| CoreError::new(ErrorCode::BootstrapFail, "script stderr was not piped"))?;
        let max_output_bytes = self.max_output_bytes;

        let run = async {
            // Drained on its own task so a chatty script never blocks on a
            // full stderr pipe while we're only reading stdout below.
            let stderr_drain = tokio::spawn(async move {
                let mut sink = Vec::new();
                let _ = stderr_pipe.read_to_end(&mut sink).await;
            });

            let mut stdout = Vec::with_capacity(max_output_bytes.min(64 * 1024));
            let mut chunk = [0u8; 8192];
            let mut overflowed = false;
            loop {
                let n = stdout_pipe
                    .read(&mut chunk)
                    .await
                    .map_err(|e| CoreError::new(ErrorCode::BootstrapFail, e.to_string()))?;
                if n == 0 {
                    break;
                }
                let remaining = max_output_bytes.saturating_sub(stdout.len());
                stdout.extend_from_slice(&chunk[..remaining.min(n)]);
                if stdout.len() >= max_output_bytes {
                    overflowed = true;
                    break;
                }
            }

            if overflowed {
                // The script is still writing past the cap; kill it rather
                // than keep reading (or leave it blocked on a full pipe).
                let _ = child.start_kill();
            }
            let status = child
                .wait()
                .await
                .map_err(|e| CoreError::new(ErrorCode::BootstrapFail, e.to_string()))?;
            let _ = stderr_drain.await;

            Ok::<_, CoreError>((stdout, status, overflowed))
        };

        let (stdout, status, overflowed) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| CoreError::new(ErrorCode::BootstrapFail, "custom bootstrap script timed out"))??;

        if !overflowed && !status.success() {
            return Err(CoreError::new(
                ErrorCode::BootstrapFail,
                format!("script exited with {}", status),
            ));
        }

        let context = String::from_utf8_lossy(&stdout).into_owned();
        Ok(BootstrapOutcome { files_loaded: vec![], context_size: context.len(), duration_ms: 0 })
    }
}

fn join_with_headers(files: &[crate::file_loader::LoadedFile]) -> String {
    let mut out = String::new();
    for file in files {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("--- {} ---\n", file.path));
        out.push_str(&file.content);
    }
    out
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
