// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level process runner — shared by `main` and integration tests.
//!
//! Owns the listener bind, background-task spawn, and graceful shutdown on
//! SIGTERM/SIGINT. Kept separate from `main` so integration tests can drive
//! a fully wired broker without going through a subprocess.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::core::Core;
use crate::transport::build_router;
use crate::transport::state::AppState;

/// Outcome of a completed `run`. Kept as a struct (rather than `()`) so
/// callers — tests in particular — can inspect the wired `Core` after
/// shutdown.
pub struct RunResult {
    pub core: Arc<Core>,
}

/// Build every collaborator, bind the listener, and serve until a shutdown
/// signal arrives. This is the single entry point both `main` and
/// integration tests use to exercise the broker end-to-end.
pub async fn run(config: Config) -> anyhow::Result<RunResult> {
    let core = Core::init(config).await?;

    let shutdown = CancellationToken::new();
    core.spawn_background_tasks(shutdown.clone());

    let state = AppState::new(core.clone());
    let router = build_router(state);

    let addr = core.config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fleetbroker listening");

    let shutdown_signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            shutdown_signal.cancel();
        })
        .await?;

    Ok(RunResult { core })
}

/// Wait for SIGTERM (Unix) or SIGINT (Ctrl-C, all platforms), whichever
/// arrives first. Background sweeps observe the same cancellation token and
/// stop on the next loop iteration; in-flight deliveries either complete or
/// leave their ticket `pending` for a watcher to recover on restart.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
