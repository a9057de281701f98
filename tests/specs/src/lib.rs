// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for black-box HTTP scenario tests against the real
//! `fleetbrokerd` binary.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `fleetbrokerd` binary.
pub fn fleetbrokerd_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs -> tests -> workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("fleetbrokerd")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Builder for configuring a spawned `fleetbrokerd` process.
pub struct BrokerBuilder {
    executor_command: Option<String>,
    executor_timeout_ms: Option<u64>,
    busy_retry_ms: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    bootstrap_timeout_secs: Option<u64>,
    auth_token: Option<String>,
}

impl Default for BrokerBuilder {
    fn default() -> Self {
        Self {
            executor_command: None,
            executor_timeout_ms: None,
            busy_retry_ms: None,
            heartbeat_interval_ms: None,
            bootstrap_timeout_secs: None,
            auth_token: None,
        }
    }
}

impl BrokerBuilder {
    pub fn executor_command(mut self, cmd: &str) -> Self {
        self.executor_command = Some(cmd.to_owned());
        self
    }

    pub fn executor_timeout_ms(mut self, ms: u64) -> Self {
        self.executor_timeout_ms = Some(ms);
        self
    }

    pub fn busy_retry_ms(mut self, ms: u64) -> Self {
        self.busy_retry_ms = Some(ms);
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(ms);
        self
    }

    pub fn bootstrap_timeout_secs(mut self, secs: u64) -> Self {
        self.bootstrap_timeout_secs = Some(secs);
        self
    }

    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    pub fn spawn(self) -> anyhow::Result<BrokerProcess> {
        let binary = fleetbrokerd_binary();
        anyhow::ensure!(binary.exists(), "fleetbrokerd binary not found at {}", binary.display());

        let port = free_port()?;
        let db_dir = tempfile::tempdir()?;
        let db_path = db_dir.path().join("fleetbroker.db");

        let mut args: Vec<String> = vec![
            "--port".into(),
            port.to_string(),
            "--host".into(),
            "127.0.0.1".into(),
            "--db-path".into(),
            db_path.to_string_lossy().into_owned(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];

        if let Some(cmd) = &self.executor_command {
            args.extend(["--executor-command".into(), cmd.clone()]);
        }
        if let Some(ms) = self.executor_timeout_ms {
            args.extend(["--executor-timeout-ms".into(), ms.to_string()]);
        }
        if let Some(ms) = self.busy_retry_ms {
            args.extend(["--busy-retry-ms".into(), ms.to_string()]);
        }
        if let Some(ms) = self.heartbeat_interval_ms {
            args.extend(["--heartbeat-interval-ms".into(), ms.to_string()]);
        }
        if let Some(secs) = self.bootstrap_timeout_secs {
            args.extend(["--bootstrap-timeout-secs".into(), secs.to_string()]);
        }
        if let Some(token) = &self.auth_token {
            args.extend(["--auth-token".into(), token.clone()]);
        }

        let child = Command::new(&binary).args(&args).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;

        Ok(BrokerProcess { child, port, _db_dir: db_dir })
    }
}

/// A running `fleetbrokerd` process, killed on drop.
pub struct BrokerProcess {
    child: Child,
    port: u16,
    _db_dir: tempfile::TempDir,
}

impl BrokerProcess {
    pub fn build() -> BrokerBuilder {
        BrokerBuilder::default()
    }

    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Poll `/api/v1/health` until it responds, up to `timeout`.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("fleetbrokerd did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for BrokerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
