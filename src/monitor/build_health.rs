// src/monitor/build_health.rs

//! BuildHealthMonitor: polls the expected build output and runs the
//! BuildFailure actions when it is missing or stale.
//!
//! Recovery cycle (one per failed poll):
//! 1. Run the configured actions in order.
//! 2. With `auto_recovery`, the first fix action that succeeds is followed
//!    by exactly one re-run of the build action. A successful rebuild ends
//!    the cycle as recovered.
//! 3. Otherwise the remaining actions still run, without further rebuilds,
//!    and the cycle ends unrecovered. The next poll starts from scratch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::threshold::ErrorReporter;
use crate::config::BuildFailureTrigger;
use crate::engine::{Condition, Dispatcher};
use crate::exec::{ActionContext, ActionExecutor};
use crate::fs::FileSystem;
use crate::shutdown::ShutdownToken;

/// Category reported to the threshold monitor for an unrecovered cycle.
pub const BUILD_ERROR_CATEGORY: &str = "build";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutputState {
    Present,
    Missing,
    Stale { age: Duration },
}

impl BuildOutputState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BuildOutputState::Present)
    }

    pub fn describe(&self, path: &Path) -> String {
        match self {
            BuildOutputState::Present => format!("build output {} is present", path.display()),
            BuildOutputState::Missing => format!("build output {} is missing", path.display()),
            BuildOutputState::Stale { age } => {
                format!("build output {} is stale ({}s old)", path.display(), age.as_secs())
            }
        }
    }
}

/// Classify the build output at `path` as of `now`.
pub fn inspect_output(
    fs: &dyn FileSystem,
    path: &Path,
    max_age: Option<Duration>,
    now: SystemTime,
) -> BuildOutputState {
    if !fs.exists(path) {
        return BuildOutputState::Missing;
    }

    let Some(max_age) = max_age else {
        return BuildOutputState::Present;
    };

    match fs.modified(path) {
        Ok(modified) => {
            // Timestamps in the future count as fresh.
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                BuildOutputState::Stale { age }
            } else {
                BuildOutputState::Present
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "cannot read build output mtime");
            BuildOutputState::Present
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// `fix` succeeded and the rebuild after it passed.
    Recovered { fix: String },
    Unrecovered,
}

/// Run one recovery cycle for a detected build failure.
pub async fn run_recovery(
    executor: &ActionExecutor,
    config: &BuildFailureTrigger,
    ctx: &ActionContext,
) -> RecoveryOutcome {
    let mut rebuilt = false;

    for action in &config.actions {
        let fixed = executor.execute(action, ctx).await.is_ok();

        let is_fix_step = config.fix_actions.iter().any(|f| f == action);
        if !(fixed && is_fix_step && config.auto_recovery && !rebuilt) {
            continue;
        }

        rebuilt = true;
        info!(fix = %action, build = %config.build_action, "fix step succeeded; rebuilding");
        match executor.execute(&config.build_action, ctx).await {
            Ok(_) => {
                info!(fix = %action, "build recovered");
                return RecoveryOutcome::Recovered {
                    fix: action.clone(),
                };
            }
            Err(e) => {
                warn!(fix = %action, error = %e, "rebuild after fix failed; continuing with remaining actions");
            }
        }
    }

    RecoveryOutcome::Unrecovered
}

pub struct BuildHealthMonitor {
    config: BuildFailureTrigger,
    output: PathBuf,
    fs: Arc<dyn FileSystem>,
    dispatcher: Dispatcher,
    errors: Option<ErrorReporter>,
}

impl BuildHealthMonitor {
    pub fn new(
        config: BuildFailureTrigger,
        project_root: &Path,
        fs: Arc<dyn FileSystem>,
        dispatcher: Dispatcher,
    ) -> Self {
        let output = project_root.join(&config.output_path);
        Self {
            config,
            output,
            fs,
            dispatcher,
            errors: None,
        }
    }

    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.errors = Some(reporter);
        self
    }

    /// One poll. Returns `None` when the output was healthy.
    pub async fn poll_once(&self) -> Option<RecoveryOutcome> {
        let state = inspect_output(
            self.fs.as_ref(),
            &self.output,
            self.config.max_age(),
            SystemTime::now(),
        );
        if state.is_healthy() {
            debug!(path = %self.output.display(), "build output healthy");
            return None;
        }

        let reason = state.describe(&self.output);
        warn!(%reason, "possible build failure");

        let condition = Condition::BuildFailure { reason };
        let ctx = self.dispatcher.context_for(&condition);
        let outcome = run_recovery(self.dispatcher.executor(), &self.config, &ctx).await;

        if outcome == RecoveryOutcome::Unrecovered {
            error!(path = %self.output.display(), "build failure unrecovered this cycle");
            if let Some(reporter) = &self.errors {
                reporter.report(BUILD_ERROR_CATEGORY);
            }
        }
        Some(outcome)
    }

    pub async fn run(self, mut shutdown: ShutdownToken) {
        let every = self.config.poll_interval();
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            path = %self.output.display(),
            poll_secs = self.config.poll_secs,
            "build health monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        info!("build health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn missing_output_is_a_failure() {
        let fs = MockFileSystem::new();
        let state = inspect_output(&fs, Path::new("/p/dist"), None, SystemTime::now());
        assert_eq!(state, BuildOutputState::Missing);
    }

    #[test]
    fn presence_is_enough_without_max_age() {
        let fs = MockFileSystem::new();
        fs.add_dir_at("/p/dist", SystemTime::UNIX_EPOCH);
        let state = inspect_output(&fs, Path::new("/p/dist"), None, SystemTime::now());
        assert_eq!(state, BuildOutputState::Present);
    }

    #[test]
    fn old_output_is_stale_when_max_age_set() {
        let fs = MockFileSystem::new();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        fs.add_file_at("/p/dist/index.js", "x", now - Duration::from_secs(7_200));

        let max_age = Some(Duration::from_secs(3_600));
        let state = inspect_output(&fs, Path::new("/p/dist/index.js"), max_age, now);
        assert_eq!(
            state,
            BuildOutputState::Stale {
                age: Duration::from_secs(7_200)
            }
        );

        let fresh = inspect_output(&fs, Path::new("/p/dist/index.js"), Some(Duration::from_secs(9_000)), now);
        assert_eq!(fresh, BuildOutputState::Present);
    }
}
