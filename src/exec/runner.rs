// src/exec/runner.rs

//! External command runner.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::BoxFuture;

/// How long to wait for the output readers after the process exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// A single command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Shell command line, opaque to the daemon.
    pub command: String,
    pub timeout: Duration,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failed(i32),
    /// Killed after exceeding its timeout.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Trait abstracting how external commands are run.
///
/// Production code uses [`ShellCommandRunner`]; tests provide a scripted
/// fake that doesn't spawn real processes. An `Err` means the command could
/// not be spawned or awaited at all.
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: CommandRequest) -> BoxFuture<'_, Result<CommandOutput>>;
}

/// Runs commands through `sh -c` (or `cmd /C`) in the project root.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    cwd: PathBuf,
}

impl ShellCommandRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, request: CommandRequest) -> BoxFuture<'_, Result<CommandOutput>> {
        Box::pin(run_shell(self.cwd.clone(), request))
    }
}

async fn run_shell(cwd: PathBuf, request: CommandRequest) -> Result<CommandOutput> {
    debug!(cmd = %request.command, timeout_ms = request.timeout.as_millis() as u64, "spawning command");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&request.command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&request.command);
        c
    };

    cmd.current_dir(&cwd)
        .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{}`", request.command))?;

    let collected = Arc::new(Mutex::new(String::new()));
    let stdout_task = child.stdout.take().map(|stdout| {
        let collected = Arc::clone(&collected);
        let command = request.command.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cmd = %command, "stdout: {}", line);
                let mut buf = collected.lock().await;
                buf.push_str(&line);
                buf.push('\n');
            }
        })
    });

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let command = request.command.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cmd = %command, "stderr: {}", line);
            }
        });
    }

    let status = match tokio::time::timeout(request.timeout, child.wait()).await {
        Ok(waited) => waited.with_context(|| format!("waiting for `{}`", request.command))?,
        Err(_) => {
            warn!(
                cmd = %request.command,
                timeout_ms = request.timeout.as_millis() as u64,
                "command exceeded its timeout; killing"
            );
            if let Err(e) = child.kill().await {
                warn!(cmd = %request.command, error = %e, "failed to kill timed-out command");
            }
            return Ok(CommandOutput {
                status: CommandStatus::TimedOut,
                stdout: String::new(),
            });
        }
    };

    // A backgrounded grandchild may keep the pipe open; don't wait on it forever.
    if let Some(task) = stdout_task {
        let _ = tokio::time::timeout(OUTPUT_DRAIN_GRACE, task).await;
    }
    let stdout = collected.lock().await.clone();

    let code = status.code().unwrap_or(-1);
    info!(
        cmd = %request.command,
        exit_code = code,
        success = status.success(),
        "command exited"
    );

    Ok(CommandOutput {
        status: if status.success() {
            CommandStatus::Success
        } else {
            CommandStatus::Failed(code)
        },
        stdout,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ShellCommandRunner {
        ShellCommandRunner::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let out = runner()
            .run(CommandRequest::new("echo hello", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.status, CommandStatus::Success);
        assert_eq!(out.stdout, "hello\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_with_code() {
        let out = runner()
            .run(CommandRequest::new("exit 3", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(out.status, CommandStatus::Failed(3));
    }

    #[tokio::test]
    async fn command_exceeding_timeout_is_killed() {
        let started = std::time::Instant::now();
        let out = runner()
            .run(CommandRequest::new("sleep 5", Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(out.status, CommandStatus::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn env_is_passed_to_the_child() {
        let out = runner()
            .run(
                CommandRequest::new("printf %s \"$AUTOPILOT_TRIGGER\"", Duration::from_secs(5))
                    .with_env("AUTOPILOT_TRIGGER", "file_change"),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout, "file_change\n");
    }
}
