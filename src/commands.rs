// src/commands.rs

//! One function per CLI operation. Each returns the process exit code;
//! `Err` is reserved for configuration errors and instance conflicts.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::{load_and_validate, warn_on_undefined_actions, write_default_if_absent, DaemonSection};
use crate::engine::{Daemon, DaemonOptions};
use crate::errors::Result;
use crate::exec::{ActionContext, ActionError, ActionExecutor, CommandRunner, ShellCommandRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::instance::{is_process_alive, send_terminate, InstanceStatus, SingleInstanceGuard};
use crate::paths::ProjectPaths;
use crate::shutdown::wait_for_signal;
use crate::types::TriggerKind;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// `init`: default config + log directory. Idempotent.
pub fn init(paths: &ProjectPaths, fs: &dyn FileSystem) -> Result<i32> {
    fs.create_dir_all(&paths.log_dir())?;
    let config_path = paths.config_file();
    if write_default_if_absent(fs, &config_path)? {
        println!("created {}", config_path.display());
    } else {
        println!("{} already exists; left unchanged", config_path.display());
    }
    Ok(0)
}

/// `start`: run in the foreground until SIGTERM / Ctrl-C.
pub async fn start(paths: ProjectPaths) -> Result<i32> {
    let fs = RealFileSystem;
    fs.create_dir_all(&paths.log_dir())?;
    write_default_if_absent(&fs, &paths.config_file())?;

    let mut daemon = Daemon::start(paths, DaemonOptions::default())?;
    daemon.run_until(wait_for_signal()).await;
    daemon.stop().await?;
    Ok(0)
}

/// `stop`: SIGTERM the recorded owner and wait for the lock to go away.
pub async fn stop(paths: &ProjectPaths) -> Result<i32> {
    let guard = SingleInstanceGuard::new(paths.lock_file());
    let record = match guard.status()? {
        InstanceStatus::NotRunning => {
            println!("autopilot is not running");
            return Ok(1);
        }
        InstanceStatus::Running(record) => record,
    };

    let timeout = load_and_validate(paths.config_file())
        .map(|c| c.daemon().stop_timeout())
        .unwrap_or_else(|_| DaemonSection::default().stop_timeout());

    info!(pid = record.pid, "sending SIGTERM");
    send_terminate(record.pid)?;

    let deadline = Instant::now() + timeout;
    loop {
        if !guard.path().exists() || !is_process_alive(record.pid) {
            // Clears a lock left behind by a process that died mid-shutdown.
            guard.status()?;
            println!("autopilot stopped (pid {})", record.pid);
            return Ok(0);
        }
        if Instant::now() >= deadline {
            println!(
                "autopilot (pid {}) did not stop within {}s",
                record.pid,
                timeout.as_secs()
            );
            return Ok(1);
        }
        sleep(STOP_POLL_INTERVAL).await;
    }
}

/// `status`: exit 0 if running, 1 if not.
pub fn status(paths: &ProjectPaths) -> Result<i32> {
    match SingleInstanceGuard::new(paths.lock_file()).status()? {
        InstanceStatus::Running(record) => {
            println!(
                "autopilot is running (pid {}, since {})",
                record.pid,
                record.started_at.to_rfc3339()
            );
            Ok(0)
        }
        InstanceStatus::NotRunning => {
            println!("autopilot is not running");
            Ok(1)
        }
    }
}

/// `logs [N]`: print the last `lines` lines of the daemon log.
pub fn logs(paths: &ProjectPaths, lines: usize) -> Result<i32> {
    let path = paths.log_file();
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            eprintln!("no log file at {}", path.display());
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };

    for line in tail_lines(&contents, lines) {
        println!("{line}");
    }
    Ok(0)
}

/// Last `n` lines of `contents`.
pub fn tail_lines(contents: &str, n: usize) -> Vec<&str> {
    let all: Vec<&str> = contents.lines().collect();
    let skip = all.len().saturating_sub(n);
    all[skip..].to_vec()
}

/// Outcome of one smoke-test action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeResult {
    pub action: String,
    pub error: Option<ActionError>,
}

impl SmokeResult {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for SmokeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "PASS {}", self.action),
            Some(e) => write!(f, "FAIL {}: {e}", self.action),
        }
    }
}

/// Run each action once through the executor, in order.
pub async fn run_smoke_tests(executor: &ActionExecutor, actions: &[String]) -> Vec<SmokeResult> {
    let ctx = ActionContext::new(TriggerKind::Manual, "smoke test");
    let mut results = Vec::with_capacity(actions.len());
    for action in actions {
        let error = executor.execute(action, &ctx).await.err();
        debug!(action = %action, passed = error.is_none(), "smoke test action finished");
        results.push(SmokeResult {
            action: action.clone(),
            error,
        });
    }
    results
}

/// `test`: exit 0 only if every smoke action passes.
pub async fn test(paths: &ProjectPaths, runner: Option<Arc<dyn CommandRunner>>) -> Result<i32> {
    let config = load_and_validate(paths.config_file())?;
    warn_on_undefined_actions(&config);
    let runner = runner.unwrap_or_else(|| Arc::new(ShellCommandRunner::new(paths.root())));
    let executor = ActionExecutor::new(&config, runner);

    let results = run_smoke_tests(&executor, &config.daemon().smoke_test).await;
    for result in &results {
        println!("{result}");
    }

    let failed = results.iter().filter(|r| !r.passed()).count();
    info!(total = results.len(), failed, "smoke test finished");
    Ok(if failed == 0 { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_returns_last_lines_in_order() {
        let text = "one\ntwo\nthree\nfour\n";
        assert_eq!(tail_lines(text, 2), vec!["three", "four"]);
        assert_eq!(tail_lines(text, 10), vec!["one", "two", "three", "four"]);
        assert!(tail_lines(text, 0).is_empty());
        assert!(tail_lines("", 5).is_empty());
    }

    #[test]
    fn smoke_result_lines() {
        let pass = SmokeResult {
            action: "lint".into(),
            error: None,
        };
        let fail = SmokeResult {
            action: "typecheck".into(),
            error: Some(ActionError::NonZeroExit {
                name: "typecheck".into(),
                code: 2,
            }),
        };
        assert_eq!(pass.to_string(), "PASS lint");
        assert_eq!(fail.to_string(), "FAIL typecheck: action 'typecheck' exited with code 2");
    }

    #[test]
    fn init_is_idempotent() {
        use crate::fs::mock::MockFileSystem;

        let fs = MockFileSystem::new();
        let paths = ProjectPaths::new("/proj");
        assert_eq!(init(&paths, &fs).unwrap(), 0);
        let first = fs.read_to_string(&paths.config_file()).unwrap();

        assert_eq!(init(&paths, &fs).unwrap(), 0);
        assert_eq!(fs.read_to_string(&paths.config_file()).unwrap(), first);
        assert!(fs.is_dir(&paths.log_dir()));
    }
}
