/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pidfile handling for the detached daemon.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The recorded pid, or `None` when the file is missing or does not hold a
    /// positive integer.
    pub fn read(&self) -> Option<u32> {
        let content = fs::read_to_string(&self.path).ok()?;
        content.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
    }

    pub fn write(&self, pid: u32) -> Result<()> {
        fs::write(&self.path, format!("{pid}\n"))
            .with_context(|| format!("Cannot write pidfile: {}", self.path.display()))?;
        debug!(pid, path = %self.path.display(), "pidfile written");
        Ok(())
    }

    /// Deletes the file.  A file that is already gone is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Cannot remove pidfile: {}", self.path.display())),
        }
    }

    /// Removes the file only if it still names `pid`, so an exiting daemon
    /// never deletes the pidfile of its replacement.
    pub fn remove_if_owned(&self, pid: u32) -> Result<()> {
        if self.read() == Some(pid) {
            self.remove()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pidfile(dir: &TempDir) -> Pidfile {
        Pidfile::new(dir.path().join("rentalito.pid"))
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let pf = pidfile(&dir);
        pf.write(4242).unwrap();
        assert_eq!(pf.read(), Some(4242));
    }

    #[test]
    fn missing_or_garbage_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let pf = pidfile(&dir);
        assert_eq!(pf.read(), None);

        fs::write(pf.path(), "not a pid").unwrap();
        assert_eq!(pf.read(), None);

        fs::write(pf.path(), "0").unwrap();
        assert_eq!(pf.read(), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let pf = pidfile(&dir);
        pf.write(1).unwrap();
        pf.remove().unwrap();
        pf.remove().unwrap();
        assert!(!pf.path().exists());
    }

    #[test]
    fn remove_if_owned_keeps_foreign_pid() {
        let dir = TempDir::new().unwrap();
        let pf = pidfile(&dir);
        pf.write(10).unwrap();

        pf.remove_if_owned(11).unwrap();
        assert_eq!(pf.read(), Some(10));

        pf.remove_if_owned(10).unwrap();
        assert!(!pf.path().exists());
    }
}
