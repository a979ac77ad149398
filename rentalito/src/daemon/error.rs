/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Lifecycle failures reported by `start` / `stop` / `restart`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// The pidfile names a process that is still running.
    #[error("pidfile {} already exists and pid {pid} is running. Daemon already running?", pidfile.display())]
    AlreadyRunning { pid: u32, pidfile: PathBuf },

    /// The freshly spawned daemon died before it could settle.
    #[error("daemon exited right after start ({status}); see the configured stderr file")]
    ExitedEarly { status: String },

    #[error("cannot signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// The daemon ignored SIGTERM for longer than the stop timeout.
    #[error("pid {pid} still running {timeout:?} after SIGTERM")]
    StopTimeout { pid: u32, timeout: Duration },
}
