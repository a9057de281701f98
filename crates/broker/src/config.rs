// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI/environment configuration for the broker process.

use std::path::PathBuf;

/// Top-level broker configuration, parsed from CLI flags with environment
/// variable fallback.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "fleetbrokerd", version, about = "Fleet ticket broker")]
pub struct Config {
    /// TCP port to listen on.
    #[arg(long, env = "FLEETBROKER_PORT", default_value_t = 4600)]
    pub port: u16,

    /// Listener host. Must resolve to an IPv4 address; loopback by default.
    #[arg(long, env = "FLEETBROKER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bearer token required on all routes except `/api/v1/health`.
    /// When unset, auth is disabled (suitable for local development only).
    #[arg(long, env = "FLEETBROKER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to the SQLite database file. `:memory:` for an ephemeral store.
    #[arg(long, env = "FLEETBROKER_DB_PATH", default_value = "fleetbroker.db")]
    pub db_path: PathBuf,

    /// Log format: `json` or `text`.
    #[arg(long, env = "FLEETBROKER_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level, used when `RUST_LOG` is unset.
    #[arg(long, env = "FLEETBROKER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Default ticket timeout in milliseconds.
    #[arg(long, env = "FLEETBROKER_TICKET_TIMEOUT_MS", default_value_t = 30_000)]
    pub ticket_timeout_ms: u64,

    /// Ticket retention after reaching a terminal state, in milliseconds.
    #[arg(long, env = "FLEETBROKER_RETENTION_MS", default_value_t = 60_000)]
    pub retention_ms: u64,

    /// Interval between repository cleanup sweeps, in milliseconds.
    #[arg(long, env = "FLEETBROKER_CLEANUP_INTERVAL_MS", default_value_t = 60_000)]
    pub cleanup_interval_ms: u64,

    /// Heartbeat interval an agent is expected to honor, in milliseconds.
    /// An agent is considered `offline` after `2 * heartbeat_interval_ms`
    /// without a heartbeat.
    #[arg(long, env = "FLEETBROKER_HEARTBEAT_INTERVAL_MS", default_value_t = 15_000)]
    pub heartbeat_interval_ms: u64,

    /// Delay before retrying a ticket whose executor reported "already
    /// executing".
    #[arg(long, env = "FLEETBROKER_BUSY_RETRY_MS", default_value_t = 2_000)]
    pub busy_retry_ms: u64,

    /// Timeout for `custom` bootstrap script execution, in seconds.
    #[arg(long, env = "FLEETBROKER_BOOTSTRAP_TIMEOUT_SECS", default_value_t = 30)]
    pub bootstrap_timeout_secs: u64,

    /// Maximum captured stdout for `custom` bootstrap scripts, in bytes.
    #[arg(long, env = "FLEETBROKER_BOOTSTRAP_MAX_OUTPUT_BYTES", default_value_t = 1_048_576)]
    pub bootstrap_max_output_bytes: usize,

    /// Shell command template used to execute headless agents. Receives the
    /// ticket payload on stdin. Unset disables headless delivery entirely —
    /// tickets routed to a headless agent fail with `executor-fail`.
    #[arg(long, env = "FLEETBROKER_EXECUTOR_COMMAND")]
    pub executor_command: Option<String>,

    /// Timeout for a single headless execution, in milliseconds.
    #[arg(long, env = "FLEETBROKER_EXECUTOR_TIMEOUT_MS", default_value_t = 60_000)]
    pub executor_timeout_ms: u64,

    /// Enable shadow mode: for agents with `commMode = shadow`, run the
    /// configured executor in parallel with the canonical tmux path purely
    /// for comparison logging.
    #[arg(long, env = "FLEETBROKER_SHADOW_ENABLED", default_value_t = false)]
    pub shadow_enabled: bool,
}

impl Config {
    /// Validate cross-field invariants that `clap` cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.log_format != "json" && self.log_format != "text" {
            anyhow::bail!("--log-format must be 'json' or 'text', got '{}'", self.log_format);
        }
        if self.host.parse::<std::net::Ipv4Addr>().is_err() {
            anyhow::bail!(
                "--host must be an IPv4 address (per the binding requirement), got '{}'",
                self.host
            );
        }
        if self.ticket_timeout_ms == 0 {
            anyhow::bail!("--ticket-timeout-ms must be greater than zero");
        }
        if self.bootstrap_max_output_bytes == 0 {
            anyhow::bail!("--bootstrap-max-output-bytes must be greater than zero");
        }
        Ok(())
    }

    /// The socket address to bind the HTTP listener to.
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let ip: std::net::Ipv4Addr = self.host.parse()?;
        Ok(std::net::SocketAddr::from((ip, self.port)))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
