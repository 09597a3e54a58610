// src/paths.rs

//! Project-relative well-known locations.
//!
//! Everything the daemon persists lives under `<project>/.autopilot/`:
//!   - `config.toml`           configuration document
//!   - `logs/autopilot.log`    append-only, line-oriented log
//!   - `autopilot.lock`        lock record `{pid, started_at}`

use std::path::{Path, PathBuf};

pub const STATE_DIR_NAME: &str = ".autopilot";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOG_DIR_NAME: &str = "logs";
pub const LOG_FILE_NAME: &str = "autopilot.log";
pub const LOCK_FILE_NAME: &str = "autopilot.lock";

/// Resolved paths for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project root; watch patterns and commands are relative to this.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.state_dir().join(CONFIG_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir().join(LOG_DIR_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join(LOG_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_lives_under_state_dir() {
        let paths = ProjectPaths::new("/work/app");
        let state = paths.state_dir();
        assert!(paths.config_file().starts_with(&state));
        assert!(paths.log_file().starts_with(&state));
        assert!(paths.lock_file().starts_with(&state));
    }

    #[test]
    fn log_file_sits_in_log_dir() {
        let paths = ProjectPaths::new(".");
        assert_eq!(paths.log_file().parent(), Some(paths.log_dir().as_path()));
        assert_eq!(paths.log_file().file_name().unwrap(), LOG_FILE_NAME);
    }
}
