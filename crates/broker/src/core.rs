// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide dependency bundle. A single `Core` is constructed once at
//! startup and holds every collaborator the transport layer needs; the only
//! other process-wide state is configuration and the embedded store's
//! connection pool, both owned here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::bootstrap::{BootstrapHistoryStore, BootstrapOrchestrator};
use crate::compaction::CompactionMonitor;
use crate::config::Config;
use crate::delivery::DeliveryEngine;
use crate::executor::{Executor, LocalProcessExecutor};
use crate::fallback::NoOpFallbackController;
use crate::monitoring::MonitoringSink;
use crate::registry::AgentRegistry;
use crate::repository::{connect_pool, SqliteTicketRepository, TicketRepository};
use crate::shadow::{ExecutorShadowController, ShadowController};

/// Every collaborator the HTTP transport needs, threaded as explicit
/// dependencies rather than module-level globals.
pub struct Core {
    pub config: Config,
    pub pool: SqlitePool,
    pub registry: Arc<AgentRegistry>,
    pub bootstrap: Arc<BootstrapOrchestrator>,
    pub compaction: Arc<CompactionMonitor>,
    pub delivery: Arc<DeliveryEngine>,
    pub monitoring: Arc<MonitoringSink>,
}

impl Core {
    /// Open the embedded store, run migrations, and wire every component.
    /// The only documented fatal startup condition is schema corruption,
    /// surfaced by propagating `connect_pool`'s / `migrate`'s errors.
    pub async fn init(config: Config) -> anyhow::Result<Arc<Core>> {
        let pool = connect_pool(config.db_path.to_string_lossy().as_ref()).await?;

        let ticket_repo = SqliteTicketRepository::new(pool.clone());
        ticket_repo.migrate().await?;

        let bootstrap_history = BootstrapHistoryStore::new(pool.clone());
        bootstrap_history.migrate().await?;

        let registry = Arc::new(AgentRegistry::new(config.heartbeat_interval_ms));
        let compaction_monitor = CompactionMonitor::new(pool.clone());
        compaction_monitor.migrate().await?;
        let compaction = Arc::new(compaction_monitor);
        let monitoring = Arc::new(MonitoringSink::default());

        let executor: Arc<dyn Executor> = {
            let mut commands = HashMap::new();
            if let Some(command) = &config.executor_command {
                commands.insert("default".to_owned(), command.clone());
            }
            Arc::new(LocalProcessExecutor::new(commands, Duration::from_millis(config.executor_timeout_ms)))
        };

        let shadow: Option<Arc<dyn ShadowController>> = if config.shadow_enabled {
            Some(Arc::new(ExecutorShadowController::new(executor.clone())))
        } else {
            None
        };

        let bootstrap = Arc::new(BootstrapOrchestrator::new(
            bootstrap_history,
            registry.clone(),
            Duration::from_secs(config.bootstrap_timeout_secs),
            config.bootstrap_max_output_bytes,
        ));

        let delivery = DeliveryEngine::new(
            Arc::new(ticket_repo) as Arc<dyn TicketRepository>,
            registry.clone(),
            executor,
            monitoring.clone(),
            Arc::new(NoOpFallbackController),
            shadow,
            Duration::from_millis(config.busy_retry_ms),
        );

        Ok(Arc::new(Core { config, pool, registry, bootstrap, compaction, delivery, monitoring }))
    }

    /// Configure `tracing` globally: JSON or compact text, level from
    /// `RUST_LOG` (falling back to `config.log_level`).
    pub fn init_tracing(config: &Config) {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

        if config.log_format == "json" {
            tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
        } else {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
        }
    }

    /// Background tasks owned by the process lifecycle: registry heartbeat
    /// sweep and ticket cleanup. Both stop when `shutdown` is cancelled.
    pub fn spawn_background_tasks(self: &Arc<Self>, shutdown: tokio_util::sync::CancellationToken) {
        self.registry.spawn_heartbeat_sweep(Duration::from_millis(self.config.heartbeat_interval_ms), shutdown.clone());
        self.delivery.spawn_cleanup_sweep(
            Duration::from_millis(self.config.cleanup_interval_ms),
            self.config.retention_ms as i64,
            shutdown,
        );
    }
}

#[cfg(test)]
#[path = "core_tests.rs"]
mod tests;
