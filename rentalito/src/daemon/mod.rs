/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process lifecycle: `start`, `stop`, `restart`, and the foreground loop.
//!
//! ```text
//! rentalito start ──spawn──► rentalito --config <abs> run     (own process group,
//!        │                            │                        stdio → config files)
//!        └── writes child pid ──► pidfile ◄── removed on exit ─┘
//!
//! rentalito stop  ── SIGTERM ──► daemon ── relay stops, broker disconnects, exit
//! ```

pub mod error;
pub mod pidfile;
pub mod signals;

pub use error::DaemonError;
pub use pidfile::Pidfile;

use std::fs::{File, OpenOptions};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::MqttBroker;
use crate::config::{DaemonSettings, RentalitoConfig};
use crate::relay::Relay;
use crate::scheduler::SlotScheduler;

// ── Constants ─────────────────────────────────────────────────────────────────

/// How long `stop` waits for the daemon to exit after SIGTERM.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period after spawning during which an exit counts as a failed start.
const START_SETTLE_TIME: Duration = Duration::from_millis(300);

/// Time allowed for the offline announcement and DISCONNECT to reach the
/// broker on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Hidden subcommand the detached child runs.
pub const RUN_SUBCOMMAND: &str = "run";

// ── Daemon ────────────────────────────────────────────────────────────────────

/// Lifecycle commands for one configuration file.
pub struct Daemon {
    config_path: PathBuf,
    settings: DaemonSettings,
    pidfile: Pidfile,
}

impl Daemon {
    pub fn new(config_path: impl Into<PathBuf>, settings: DaemonSettings) -> Self {
        let pidfile = Pidfile::new(settings.pidfile.clone());
        Self {
            config_path: config_path.into(),
            settings,
            pidfile,
        }
    }

    pub fn pidfile(&self) -> &Pidfile {
        &self.pidfile
    }

    /// Spawns the detached daemon and records its pid.
    ///
    /// # Errors
    /// [`DaemonError::AlreadyRunning`] when the pidfile names a live process,
    /// [`DaemonError::ExitedEarly`] when the child dies straight away, and
    /// I/O errors for the executable, stdio files and pidfile.
    pub async fn start(&self) -> Result<u32> {
        if let Some(pid) = self.pidfile.read() {
            if signals::is_alive(pid) {
                return Err(DaemonError::AlreadyRunning {
                    pid,
                    pidfile: self.pidfile.path().to_path_buf(),
                }
                .into());
            }
            warn!(pid, "Removing stale pidfile");
            self.pidfile.remove()?;
        }

        let exe = std::env::current_exe().context("Cannot locate the rentalito executable")?;
        let config_path = std::fs::canonicalize(&self.config_path).with_context(|| {
            format!("Cannot resolve configuration file: {}", self.config_path.display())
        })?;

        let mut child = Command::new(exe)
            .arg("--config")
            .arg(&config_path)
            .arg(RUN_SUBCOMMAND)
            .stdin(Stdio::null())
            .stdout(open_log(&self.settings.stdout)?)
            .stderr(open_log(&self.settings.stderr)?)
            .process_group(0)
            .spawn()
            .context("Cannot spawn the daemon process")?;

        let pid = child.id();
        self.pidfile.write(pid)?;

        tokio::time::sleep(START_SETTLE_TIME).await;
        if let Some(status) = child.try_wait().context("Cannot query the daemon process")? {
            self.pidfile.remove()?;
            return Err(DaemonError::ExitedEarly {
                status: status.to_string(),
            }
            .into());
        }

        info!(pid, config = %config_path.display(), "Daemon started");
        Ok(pid)
    }

    /// Terminates the daemon named in the pidfile and waits for it to exit.
    ///
    /// A missing pidfile is not an error (restart must work on a stopped
    /// daemon).
    pub async fn stop(&self) -> Result<()> {
        let Some(pid) = self.pidfile.read() else {
            warn!(
                "pidfile {} does not exist. Daemon not running?",
                self.pidfile.path().display()
            );
            return Ok(());
        };

        if !signals::is_alive(pid) {
            warn!(pid, "Daemon not running, removing stale pidfile");
            return self.pidfile.remove();
        }

        signals::terminate(pid).map_err(|source| DaemonError::Signal { pid, source })?;
        debug!(pid, "SIGTERM sent");

        let deadline = Instant::now() + STOP_TIMEOUT;
        while signals::is_alive(pid) {
            if Instant::now() >= deadline {
                return Err(DaemonError::StopTimeout {
                    pid,
                    timeout: STOP_TIMEOUT,
                }
                .into());
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        self.pidfile.remove()?;
        info!(pid, "Daemon stopped");
        Ok(())
    }

    pub async fn restart(&self) -> Result<u32> {
        self.stop().await?;
        self.start().await
    }
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open output file: {}", path.display()))
}

// ── Foreground loop ───────────────────────────────────────────────────────────

/// Connects, seeds synthetic topics and relays until a termination signal
/// arrives or the initial connection fails.
pub async fn run_foreground(config: RentalitoConfig) -> Result<()> {
    let RentalitoConfig {
        daemon,
        pacing,
        publish_to,
        registry,
        broker,
        renderer,
        ..
    } = config;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(registry);
    let mut scheduler = SlotScheduler::new(Arc::clone(&registry), renderer, pacing);

    let synthetic: Vec<String> = scheduler
        .renderer()
        .synthetic_topics()
        .map(str::to_owned)
        .collect();
    for topic in &synthetic {
        scheduler.seed(topic, b"");
    }

    // Separate tokens: the pump must outlive the relay long enough to flush
    // the offline announcement and DISCONNECT.
    let shutdown = CancellationToken::new();
    let pump_cancel = CancellationToken::new();

    let MqttBroker {
        outbound,
        events,
        pump,
    } = MqttBroker::spawn(&broker, pump_cancel.clone());
    let session = outbound.clone();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signals::wait_for_shutdown_signal().await {
            Ok(()) => info!("Termination signal received"),
            Err(e) => error!(error = %e, "Cannot listen for signals, shutting down"),
        }
        signal_token.cancel();
    });

    let mut relay = Relay::new(scheduler, registry, outbound, publish_to);
    let result = relay.run(events, shutdown).await;
    drop(relay);

    if let Err(e) = session.disconnect().await {
        debug!(error = %e, "disconnect request not delivered");
    }
    if tokio::time::timeout(FLUSH_TIMEOUT, pump).await.is_err() {
        debug!("broker pump did not finish in time");
    }
    pump_cancel.cancel();

    Pidfile::new(daemon.pidfile).remove_if_owned(std::process::id())?;

    result?;
    info!("Exiting");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn daemon(dir: &TempDir) -> Daemon {
        let settings = DaemonSettings {
            pidfile: dir.path().join("rentalito.pid"),
            stdout: PathBuf::from("/dev/null"),
            stderr: PathBuf::from("/dev/null"),
        };
        Daemon::new(dir.path().join("rentalito.yaml"), settings)
    }

    #[tokio::test]
    async fn stop_without_pidfile_succeeds() {
        let dir = TempDir::new().unwrap();
        daemon(&dir).stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_clears_stale_pidfile() {
        let dir = TempDir::new().unwrap();
        let d = daemon(&dir);
        // pid_t::MAX is never a live process
        d.pidfile().write(i32::MAX as u32).unwrap();

        d.stop().await.unwrap();
        assert!(!d.pidfile().path().exists());
    }

    #[tokio::test]
    async fn start_refuses_when_already_running() {
        let dir = TempDir::new().unwrap();
        let d = daemon(&dir);
        d.pidfile().write(std::process::id()).unwrap();

        let err = d.start().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DaemonError>(),
            Some(DaemonError::AlreadyRunning { .. })
        ));
        assert_eq!(d.pidfile().read(), Some(std::process::id()));
    }

    #[tokio::test]
    async fn start_fails_without_config_file() {
        let dir = TempDir::new().unwrap();
        let d = daemon(&dir);
        assert!(d.start().await.is_err());
        assert!(!d.pidfile().path().exists());
    }
}
