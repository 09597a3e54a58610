// src/engine/health.rs

//! Periodic self health-check. A failed check is logged, never fatal.

use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub lock_present: bool,
    pub config_readable: bool,
    pub active_detectors: usize,
    /// `None` when the probe could not read the process.
    pub memory_bytes: Option<u64>,
    pub memory_ceiling: u64,
}

impl HealthReport {
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.lock_present {
            problems.push("instance lock file is missing".to_string());
        }
        if !self.config_readable {
            problems.push("configuration is not readable or invalid".to_string());
        }
        if self.active_detectors == 0 {
            problems.push("no detectors are active".to_string());
        }
        if let Some(used) = self.memory_bytes {
            if used > self.memory_ceiling {
                problems.push(format!(
                    "memory usage {} MiB exceeds ceiling {} MiB",
                    used / (1024 * 1024),
                    self.memory_ceiling / (1024 * 1024)
                ));
            }
        }
        problems
    }

    pub fn is_healthy(&self) -> bool {
        self.problems().is_empty()
    }
}

/// Resident memory of the current process, in bytes.
pub fn current_memory_bytes() -> Option<u64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    sys.process(pid).map(|p| p.memory())
}
