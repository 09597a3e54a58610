// src/instance.rs

//! SingleInstanceGuard: one daemon per project.
//!
//! The lock file (`.autopilot/autopilot.lock`) holds a small TOML record with
//! the owner's pid and start time. It is created atomically (write a private
//! temp file, then hard-link it into place, which fails if the target
//! exists). A record whose pid is no longer alive is stale and gets cleared
//! on the next `acquire` or `status`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{AutopilotError, Result};

/// Bounded so a lock file that keeps reappearing cannot spin forever.
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    NotRunning,
    Running(LockRecord),
}

#[derive(Debug, Clone)]
pub struct SingleInstanceGuard {
    path: PathBuf,
}

impl SingleInstanceGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock for the current process.
    ///
    /// Fails with [`AutopilotError::AlreadyRunning`] when a live process owns
    /// the record. Stale or unreadable records are removed and the attempt
    /// is repeated.
    pub fn acquire(&self) -> Result<InstanceLock> {
        let record = LockRecord::current();
        let contents = toml::to_string(&record)?;

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            match self.try_create(&contents) {
                Ok(()) => {
                    info!(path = %self.path.display(), pid = record.pid, "instance lock acquired");
                    return Ok(InstanceLock {
                        path: self.path.clone(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            match self.read_record() {
                Ok(Some(existing)) if is_process_alive(existing.pid) => {
                    return Err(AutopilotError::AlreadyRunning {
                        pid: existing.pid,
                        since: existing.started_at,
                    });
                }
                Ok(Some(existing)) => {
                    warn!(pid = existing.pid, "clearing stale instance lock");
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "clearing unreadable instance lock");
                }
            }
            self.remove_record()?;
        }

        Err(AutopilotError::Other(anyhow::anyhow!(
            "could not acquire instance lock {} after {MAX_ACQUIRE_ATTEMPTS} attempts",
            self.path.display()
        )))
    }

    /// Report on the owner without acquiring. Stale records are removed.
    pub fn status(&self) -> Result<InstanceStatus> {
        match self.read_record() {
            Ok(Some(record)) if is_process_alive(record.pid) => Ok(InstanceStatus::Running(record)),
            Ok(Some(record)) => {
                debug!(pid = record.pid, "removing stale instance lock");
                self.remove_record()?;
                Ok(InstanceStatus::NotRunning)
            }
            Ok(None) => Ok(InstanceStatus::NotRunning),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "removing unreadable instance lock");
                self.remove_record()?;
                Ok(InstanceStatus::NotRunning)
            }
        }
    }

    /// `Ok(None)` when there is no lock file.
    pub fn read_record(&self) -> Result<Option<LockRecord>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn try_create(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self
            .path
            .with_extension(format!("lock.{}.tmp", std::process::id()));
        fs::write(&tmp, contents)?;
        let linked = fs::hard_link(&tmp, &self.path);
        let _ = fs::remove_file(&tmp);
        linked
    }

    fn remove_record(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A held instance lock. The record is removed on [`release`](Self::release)
/// or when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_if_owned(&self.path)
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_if_owned(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release instance lock");
        }
    }
}

/// Remove the lock file only if it still names this process.
fn remove_if_owned(path: &Path) -> Result<()> {
    let guard = SingleInstanceGuard::new(path);
    match guard.read_record() {
        Ok(Some(record)) if record.pid != std::process::id() => {
            warn!(pid = record.pid, "instance lock now owned by another process; leaving it");
            Ok(())
        }
        Ok(None) => Ok(()),
        _ => {
            guard.remove_record()?;
            info!(path = %path.display(), "instance lock released");
            Ok(())
        }
    }
}

/// Signal-0 liveness probe. `EPERM` means the process exists but belongs to
/// someone else.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 performs only the existence/permission check.
    let ret = unsafe { libc::kill(pid, 0) };
    ret == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_process_alive(pid: u32) -> bool {
    pid != 0
}

/// Ask the process to shut down (SIGTERM).
#[cfg(unix)]
pub fn send_terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain signal delivery to a pid read from the lock record.
    let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn send_terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "stopping a running instance requires a unix platform",
    ))
}
