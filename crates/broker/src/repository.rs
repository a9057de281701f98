// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable ticket persistence keyed by `ticketId`, with a secondary index on
//! `(targetAgent, status = pending)`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{CoreError, ErrorCode};
use crate::ticket::{Ticket, TicketError, TicketResponse, TicketStatus};

/// Persistence boundary the Delivery Engine depends on. Any write error
/// propagates as `ErrorCode::Storage`; reads that fail return `None` and log.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn save(&self, ticket: &Ticket) -> Result<(), CoreError>;
    async fn get(&self, ticket_id: Uuid) -> Option<Ticket>;
    async fn update_status(
        &self,
        ticket_id: Uuid,
        status: TicketStatus,
        response: Option<TicketResponse>,
        error: Option<TicketError>,
    ) -> Result<(), CoreError>;
    async fn get_pending(&self, target_agent: &str) -> Vec<Ticket>;
    async fn cleanup(&self, max_age_ms: i64) -> Result<u64, CoreError>;
    async fn count_all(&self) -> Result<u64, CoreError>;
}

/// Open (and create if missing) the single embedded relational store this
/// process uses for every table (tickets, bootstrap history). `path` may be
/// `:memory:` for an ephemeral store. Schema corruption at this point is the
/// system's one documented fatal startup condition.
pub async fn connect_pool(path: &str) -> anyhow::Result<SqlitePool> {
    let options = if path == ":memory:" {
        SqliteConnectOptions::new().in_memory(true)
    } else {
        SqliteConnectOptions::new().filename(path).create_if_missing(true)
    };
    Ok(SqlitePoolOptions::new().max_connections(8).connect_with(options).await?)
}

/// `sqlx`-backed implementation over an embedded SQLite database, per the
/// "single embedded relational store" requirement.
#[derive(Clone)]
pub struct SqliteTicketRepository {
    pool: SqlitePool,
}

impl SqliteTicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Convenience constructor for tests and single-table standalone use:
    /// opens its own pool and migrates it.
    #[cfg(test)]
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        let pool = connect_pool(path).await?;
        let repo = Self::new(pool);
        repo.migrate().await?;
        Ok(repo)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                ticket_id TEXT PRIMARY KEY,
                target_agent TEXT NOT NULL,
                origin_agent TEXT NOT NULL,
                payload TEXT NOT NULL,
                metadata TEXT NOT NULL,
                expect_reply INTEGER NOT NULL,
                timeout_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                response TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tickets_pending ON tickets (target_agent, status)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, sqlx::Error> {
        let status_str: String = row.try_get("status")?;
        let status = serde_json::from_value(serde_json::Value::String(status_str))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let payload: serde_json::Value = serde_json::from_str(row.try_get("payload")?)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let metadata = serde_json::from_str(row.try_get("metadata")?)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let response: Option<String> = row.try_get("response")?;
        let response = response
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let error: Option<String> = row.try_get("error")?;
        let error = error
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Ticket {
            ticket_id: row.try_get::<String, _>("ticket_id")?.parse().unwrap_or_else(|_| Uuid::nil()),
            target_agent: row.try_get("target_agent")?,
            origin_agent: row.try_get("origin_agent")?,
            payload,
            metadata,
            expect_reply: row.try_get::<i64, _>("expect_reply")? != 0,
            timeout_ms: row.try_get::<i64, _>("timeout_ms")? as u64,
            status,
            response,
            error,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn save(&self, ticket: &Ticket) -> Result<(), CoreError> {
        let status = serde_json::to_value(ticket.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let payload = serde_json::to_string(&ticket.payload)
            .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        let metadata = serde_json::to_string(&ticket.metadata)
            .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        let response = ticket
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        let error = ticket
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO tickets
                (ticket_id, target_agent, origin_agent, payload, metadata, expect_reply,
                 timeout_ms, status, response, error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(ticket_id) DO UPDATE SET
                target_agent = excluded.target_agent,
                origin_agent = excluded.origin_agent,
                payload = excluded.payload,
                metadata = excluded.metadata,
                expect_reply = excluded.expect_reply,
                timeout_ms = excluded.timeout_ms,
                status = excluded.status,
                response = excluded.response,
                error = excluded.error,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ticket.ticket_id.to_string())
        .bind(&ticket.target_agent)
        .bind(&ticket.origin_agent)
        .bind(payload)
        .bind(metadata)
        .bind(ticket.expect_reply as i64)
        .bind(ticket.timeout_ms as i64)
        .bind(status)
        .bind(response)
        .bind(error)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        Ok(())
    }

    async fn get(&self, ticket_id: Uuid) -> Option<Ticket> {
        let row = sqlx::query("SELECT * FROM tickets WHERE ticket_id = ?1")
            .bind(ticket_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()?;
        match Self::row_to_ticket(&row) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                tracing::warn!(error = %e, %ticket_id, "failed to decode ticket row");
                None
            }
        }
    }

    async fn update_status(
        &self,
        ticket_id: Uuid,
        status: TicketStatus,
        response: Option<TicketResponse>,
        error: Option<TicketError>,
    ) -> Result<(), CoreError> {
        let Some(mut ticket) = self.get(ticket_id).await else {
            // Unknown ticket: fails silently per the repository contract.
            return Ok(());
        };
        ticket.status = status;
        if response.is_some() {
            ticket.response = response;
        }
        if error.is_some() {
            ticket.error = error;
        }
        ticket.updated_at = Utc::now();
        self.save(&ticket).await
    }

    async fn get_pending(&self, target_agent: &str) -> Vec<Ticket> {
        let rows = sqlx::query(
            "SELECT * FROM tickets WHERE target_agent = ?1 AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(target_agent)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default();
        rows.iter().filter_map(|r| Self::row_to_ticket(r).ok()).collect()
    }

    async fn cleanup(&self, max_age_ms: i64) -> Result<u64, CoreError> {
        let cutoff = Utc::now() - chrono::Duration::milliseconds(max_age_ms);
        let result = sqlx::query(
            "DELETE FROM tickets WHERE status IN ('responded', 'timeout', 'error') AND updated_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn count_all(&self) -> Result<u64, CoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tickets")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::new(ErrorCode::Storage, e.to_string()))?;
        let n: i64 = row.try_get("n").unwrap_or(0);
        Ok(n as u64)
    }
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
