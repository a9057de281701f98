// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent conversational health heuristic: a persisted row per turn,
//! keyed `(agentId, measuredAt)`, with warning/critical severity
//! classification against the latest row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

const TURNS_WARNING: u64 = 50;
const TURNS_CRITICAL: u64 = 100;
const TOKENS_WARNING: u64 = 100_000;
const TOKENS_CRITICAL: u64 = 200_000;
const ERROR_RATE_WARNING: f64 = 0.20;
const ERROR_RATE_CRITICAL: f64 = 0.40;
const ERROR_RATE_MIN_TURNS: u64 = 10;

/// Overall conversational health, the maximum of each signal's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

/// One measurement snapshot. Primary key `(agentId, measuredAt)`; the
/// latest row per agent is the canonical state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionMetric {
    pub agent_id: String,
    pub conversation_turns: u64,
    pub total_tokens: u64,
    pub error_count: u64,
    pub confusion_count: u64,
    pub avg_response_time: f64,
    pub measured_at: DateTime<Utc>,
}

/// Parameters accepted by `CompactionMonitor::track_turn`.
#[derive(Debug, Clone, Default)]
pub struct TrackTurn {
    pub tokens: Option<u64>,
    pub error: bool,
    pub response_time: Option<f64>,
    pub confusion_count: Option<u64>,
}

/// The result of evaluating thresholds against a metric snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionStatus {
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CompactionMetric>,
}

fn recommendation_for(severity: Severity) -> String {
    match severity {
        Severity::Normal => "no action needed".to_owned(),
        Severity::Warning => "monitor; consider compacting soon".to_owned(),
        Severity::Critical => "compact or restart the agent now".to_owned(),
    }
}

/// Classify turns/tokens/error-rate against the threshold table. Pure
/// function so the documented boundary examples can be asserted directly.
pub fn check_compaction(turns: u64, tokens: u64, errors: u64) -> (Severity, Vec<String>) {
    let mut severity = Severity::Normal;
    let mut reasons = Vec::new();

    if turns >= TURNS_CRITICAL {
        severity = severity.max(Severity::Critical);
        reasons.push(format!("conversation turns {turns} >= {TURNS_CRITICAL}"));
    } else if turns >= TURNS_WARNING {
        severity = severity.max(Severity::Warning);
        reasons.push(format!("conversation turns {turns} >= {TURNS_WARNING}"));
    }

    if tokens >= TOKENS_CRITICAL {
        severity = severity.max(Severity::Critical);
        reasons.push(format!("total tokens {tokens} >= {TOKENS_CRITICAL}"));
    } else if tokens >= TOKENS_WARNING {
        severity = severity.max(Severity::Warning);
        reasons.push(format!("total tokens {tokens} >= {TOKENS_WARNING}"));
    }

    if turns > ERROR_RATE_MIN_TURNS {
        let rate = errors as f64 / turns as f64;
        if rate >= ERROR_RATE_CRITICAL {
            severity = severity.max(Severity::Critical);
            reasons.push(format!("error rate {rate:.2} >= {ERROR_RATE_CRITICAL}"));
        } else if rate >= ERROR_RATE_WARNING {
            severity = severity.max(Severity::Warning);
            reasons.push(format!("error rate {rate:.2} >= {ERROR_RATE_WARNING}"));
        }
    }

    if reasons.is_empty() {
        reasons.push("operating normally".to_owned());
    }
    (severity, reasons)
}

/// Appends a new row per `trackTurn` call to the shared embedded store so
/// `history` can return the last N rows, per the external-interfaces
/// contract; `status` always reads back the latest row.
pub struct CompactionMonitor {
    pool: SqlitePool,
}

impl CompactionMonitor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS compaction_metrics (
                agent_id TEXT NOT NULL,
                measured_at TEXT NOT NULL,
                conversation_turns INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                error_count INTEGER NOT NULL,
                confusion_count INTEGER NOT NULL,
                avg_response_time REAL NOT NULL,
                PRIMARY KEY (agent_id, measured_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self, agent_id: &str) -> Option<CompactionMetric> {
        let row = sqlx::query(
            "SELECT * FROM compaction_metrics WHERE agent_id = ?1 ORDER BY measured_at DESC LIMIT 1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()?;
        Self::row_to_metric(&row).ok()
    }

    fn row_to_metric(row: &sqlx::sqlite::SqliteRow) -> Result<CompactionMetric, sqlx::Error> {
        Ok(CompactionMetric {
            agent_id: row.try_get("agent_id")?,
            conversation_turns: row.try_get::<i64, _>("conversation_turns")? as u64,
            total_tokens: row.try_get::<i64, _>("total_tokens")? as u64,
            error_count: row.try_get::<i64, _>("error_count")? as u64,
            confusion_count: row.try_get::<i64, _>("confusion_count")? as u64,
            avg_response_time: row.try_get("avg_response_time")?,
            measured_at: row.try_get("measured_at")?,
        })
    }

    /// Read the latest snapshot (if any), increment counters, and persist
    /// a new row. A collision on the `(agentId, measuredAt)` primary key
    /// (two turns tracked within the same microsecond) overwrites rather
    /// than errors.
    pub async fn track_turn(&self, agent_id: &str, turn: TrackTurn) -> CompactionStatus {
        let previous = self.latest(agent_id).await;
        let conversation_turns = previous.as_ref().map(|m| m.conversation_turns).unwrap_or(0) + 1;
        let total_tokens = previous.as_ref().map(|m| m.total_tokens).unwrap_or(0) + turn.tokens.unwrap_or(0);
        let error_count = previous.as_ref().map(|m| m.error_count).unwrap_or(0) + u64::from(turn.error);
        let confusion_count =
            previous.as_ref().map(|m| m.confusion_count).unwrap_or(0) + turn.confusion_count.unwrap_or(0);
        let avg_response_time = match (&previous, turn.response_time) {
            (Some(prev), Some(rt)) => {
                (prev.avg_response_time * (conversation_turns - 1) as f64 + rt) / conversation_turns as f64
            }
            (None, Some(rt)) => rt,
            (Some(prev), None) => prev.avg_response_time,
            (None, None) => 0.0,
        };

        let metric = CompactionMetric {
            agent_id: agent_id.to_owned(),
            conversation_turns,
            total_tokens,
            error_count,
            confusion_count,
            avg_response_time,
            measured_at: Utc::now(),
        };

        let insert = sqlx::query(
            "INSERT INTO compaction_metrics \
             (agent_id, measured_at, conversation_turns, total_tokens, error_count, confusion_count, avg_response_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(agent_id, measured_at) DO UPDATE SET \
             conversation_turns = excluded.conversation_turns, total_tokens = excluded.total_tokens, \
             error_count = excluded.error_count, confusion_count = excluded.confusion_count, \
             avg_response_time = excluded.avg_response_time",
        )
        .bind(&metric.agent_id)
        .bind(metric.measured_at)
        .bind(metric.conversation_turns as i64)
        .bind(metric.total_tokens as i64)
        .bind(metric.error_count as i64)
        .bind(metric.confusion_count as i64)
        .bind(metric.avg_response_time)
        .execute(&self.pool)
        .await;
        if let Err(err) = insert {
            tracing::error!(%agent_id, error = %err, "failed to persist compaction metric");
        }

        let (severity, reasons) = check_compaction(conversation_turns, total_tokens, error_count);
        let status = CompactionStatus {
            severity,
            reasons,
            recommendation: recommendation_for(severity),
            metrics: Some(metric),
        };
        match severity {
            Severity::Normal => tracing::info!(%agent_id, "compaction status normal"),
            Severity::Warning => tracing::warn!(%agent_id, reasons = ?status.reasons, "compaction warning"),
            Severity::Critical => tracing::error!(%agent_id, reasons = ?status.reasons, "compaction critical"),
        }
        status
    }

    /// The latest snapshot's status without recording a new turn.
    pub async fn status(&self, agent_id: &str) -> Option<CompactionStatus> {
        let metric = self.latest(agent_id).await?;
        let (severity, reasons) =
            check_compaction(metric.conversation_turns, metric.total_tokens, metric.error_count);
        Some(CompactionStatus {
            severity,
            reasons,
            recommendation: recommendation_for(severity),
            metrics: Some(metric),
        })
    }

    /// The last `limit` rows for an agent, newest first.
    pub async fn history(&self, agent_id: &str, limit: u32) -> Vec<CompactionMetric> {
        let rows = sqlx::query(
            "SELECT * FROM compaction_metrics WHERE agent_id = ?1 ORDER BY measured_at DESC LIMIT ?2",
        )
        .bind(agent_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();
        rows.iter().filter_map(|r| Self::row_to_metric(r).ok()).collect()
    }

    /// Delete all rows for the agent. Invoked on restart.
    pub async fn reset_metrics(&self, agent_id: &str) {
        if let Err(err) = sqlx::query("DELETE FROM compaction_metrics WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(&self.pool)
            .await
        {
            tracing::warn!(%agent_id, error = %err, "failed to reset compaction metrics");
        }
    }
}

#[cfg(test)]
#[path = "compaction_tests.rs"]
mod tests;
