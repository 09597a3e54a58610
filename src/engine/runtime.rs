// src/engine/runtime.rs

//! The daemon: starts every enabled detector against one shared dispatcher,
//! runs the health loop while `Running`, and tears everything down on stop.
//!
//! Each detector owns its runtime state and runs as its own task. All of
//! them observe the same [`ShutdownToken`]; `stop` cancels it, closes the
//! file watch and then awaits every task, so actions already in flight run
//! to completion or their timeout.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::dispatch::{DispatchTable, Dispatcher};
use super::health::{current_memory_bytes, HealthReport};
use super::lifecycle::Lifecycle;
use super::DaemonState;
use crate::config::{load_and_validate, reload, warn_on_undefined_actions, ConfigFile};
use crate::errors::{AutopilotError, Result};
use crate::exec::{ActionExecutor, CommandRunner, Notifier, ShellCommandRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::instance::{InstanceLock, SingleInstanceGuard};
use crate::monitor::threshold::ErrorReporter;
use crate::monitor::{
    BuildHealthMonitor, BulkChangeDetector, ChangeSource, CommitWatcher, GitChangeSource,
    TaskScheduler, ThresholdMonitor,
};
use crate::paths::ProjectPaths;
use crate::shutdown::Shutdown;
use crate::watch::{spawn_watcher, ChangeBatcher, FileEvent, WatchProfile, WatcherHandle};

const ERROR_REPORT_CAPACITY: usize = 256;

/// Collaborators the daemon would otherwise build itself.
#[derive(Default)]
pub struct DaemonOptions {
    pub runner: Option<Arc<dyn CommandRunner>>,
    pub changes: Option<Arc<dyn ChangeSource>>,
    pub fs: Option<Arc<dyn FileSystem>>,
    /// Feed file events directly instead of watching the project root.
    pub file_events: Option<mpsc::UnboundedReceiver<FileEvent>>,
    pub notifiers: Vec<(String, Arc<dyn Notifier>)>,
    pub retry_backoff: Option<Duration>,
}

impl fmt::Debug for DaemonOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonOptions")
            .field("runner", &self.runner.is_some())
            .field("changes", &self.changes.is_some())
            .field("file_events", &self.file_events.is_some())
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

pub struct Daemon {
    paths: ProjectPaths,
    config: ConfigFile,
    lifecycle: Lifecycle,
    lock: Option<InstanceLock>,
    shutdown: Shutdown,
    detectors: Vec<(&'static str, JoinHandle<()>)>,
    watcher: Option<WatcherHandle>,
    dispatcher: Dispatcher,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon")
            .field("root", &self.paths.root())
            .field("state", &self.lifecycle.state())
            .field("detectors", &self.detector_names())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Acquire the instance lock, load the configuration and start every
    /// enabled detector. Must be called inside a tokio runtime.
    pub fn start(paths: ProjectPaths, mut options: DaemonOptions) -> Result<Self> {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_start()?;

        let fs: Arc<dyn FileSystem> = options.fs.take().unwrap_or_else(|| Arc::new(RealFileSystem));
        fs.create_dir_all(&paths.state_dir())?;

        let lock = SingleInstanceGuard::new(paths.lock_file()).acquire()?;
        let config = load_and_validate(paths.config_file())?;
        warn_on_undefined_actions(&config);

        let runner: Arc<dyn CommandRunner> = options
            .runner
            .take()
            .unwrap_or_else(|| Arc::new(ShellCommandRunner::new(paths.root())));

        let triggers = config.triggers().clone();
        let (reporter, reports) = if triggers.error_threshold.enabled {
            let (reporter, reports) = ErrorReporter::channel(ERROR_REPORT_CAPACITY);
            (Some(reporter), Some(reports))
        } else {
            (None, None)
        };

        let mut executor =
            ActionExecutor::new(&config, Arc::clone(&runner)).with_config_path(paths.config_file());
        if let Some(backoff) = options.retry_backoff {
            executor = executor.with_retry_backoff(backoff);
        }
        for (channel, notifier) in options.notifiers.drain(..) {
            executor = executor.with_notifier(channel, notifier);
        }
        if let Some(reporter) = &reporter {
            executor = executor.with_error_reporter(reporter.clone());
        }

        let dispatcher = Dispatcher::new(Arc::new(executor), DispatchTable::from_config(&config));
        let shutdown = Shutdown::new();
        let mut detectors: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        let mut watcher = None;

        if triggers.file_change.enabled {
            let events = match options.file_events.take() {
                Some(rx) => Some(rx),
                None => {
                    let profile = WatchProfile::from_config(&triggers.file_change)
                        .map_err(|e| AutopilotError::ConfigError(format!("{e:#}")))?;
                    let (tx, rx) = mpsc::unbounded_channel();
                    match spawn_watcher(paths.root(), profile, tx) {
                        Ok(handle) => {
                            watcher = Some(handle);
                            Some(rx)
                        }
                        Err(e) => {
                            warn!(error = %format!("{e:#}"), "file watcher unavailable; file-change trigger disabled");
                            None
                        }
                    }
                }
            };
            if let Some(events) = events {
                let batcher = ChangeBatcher::new(triggers.file_change.debounce(), events, dispatcher.clone());
                detectors.push(("change_batcher", tokio::spawn(batcher.run(shutdown.token()))));
            }
        }

        let needs_vcs = triggers.bulk_change.enabled || triggers.commit_hook.enabled;
        let changes: Option<Arc<dyn ChangeSource>> = match options.changes.take() {
            Some(source) => Some(source),
            None if needs_vcs => Some(Arc::new(GitChangeSource::new(
                Arc::clone(&runner),
                triggers.bulk_change.baseline.clone(),
            ))),
            None => None,
        };

        if let (true, Some(source)) = (triggers.bulk_change.enabled, &changes) {
            let detector = BulkChangeDetector::new(&triggers.bulk_change, Arc::clone(source), dispatcher.clone());
            detectors.push(("bulk_change", tokio::spawn(detector.run(shutdown.token()))));
        }

        if let (true, Some(source)) = (triggers.commit_hook.enabled, &changes) {
            let commits = CommitWatcher::new(&triggers.commit_hook, Arc::clone(source), dispatcher.clone());
            detectors.push(("commit_hook", tokio::spawn(commits.run(shutdown.token()))));
        }

        if triggers.build_failure.enabled {
            let mut monitor = BuildHealthMonitor::new(
                triggers.build_failure.clone(),
                paths.root(),
                Arc::clone(&fs),
                dispatcher.clone(),
            );
            if let Some(reporter) = &reporter {
                monitor = monitor.with_error_reporter(reporter.clone());
            }
            detectors.push(("build_health", tokio::spawn(monitor.run(shutdown.token()))));
        }

        if triggers.scheduled_task.enabled {
            let scheduler = TaskScheduler::from_config(&triggers.scheduled_task);
            let task = scheduler.run(triggers.scheduled_task.clone(), dispatcher.clone(), shutdown.token());
            detectors.push(("task_scheduler", tokio::spawn(task)));
        }

        if let Some(reports) = reports {
            let monitor = ThresholdMonitor::new(triggers.error_threshold.clone(), reports, dispatcher.clone());
            detectors.push(("threshold_monitor", tokio::spawn(monitor.run(shutdown.token()))));
        }

        lifecycle.mark_running()?;
        let daemon = Self {
            paths,
            config,
            lifecycle,
            lock: Some(lock),
            shutdown,
            detectors,
            watcher,
            dispatcher,
            fs,
        };
        info!(
            root = %daemon.paths.root().display(),
            detectors = ?daemon.detector_names(),
            "autopilot daemon running"
        );
        Ok(daemon)
    }

    pub fn state(&self) -> DaemonState {
        self.lifecycle.state()
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|(name, _)| *name).collect()
    }

    /// Detector tasks that have not exited.
    pub fn active_detectors(&self) -> usize {
        self.detectors.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    pub async fn health_check(&self) -> HealthReport {
        HealthReport {
            lock_present: self.fs.exists(&self.paths.lock_file()),
            config_readable: reload(self.paths.config_file()).await.is_ok(),
            active_detectors: self.active_detectors(),
            memory_bytes: current_memory_bytes(),
            memory_ceiling: self.config.daemon().memory_ceiling_bytes(),
        }
    }

    /// Run the periodic health check until `signal` completes.
    pub async fn run_until<F>(&mut self, signal: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.daemon().health_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.health_check().await;
                    let problems = report.problems();
                    if problems.is_empty() {
                        debug!(detectors = report.active_detectors, memory_bytes = ?report.memory_bytes, "health check ok");
                    } else {
                        warn!(?problems, "health check failed");
                    }
                }
            }
        }
    }

    /// Cancel every detector, close the watch, wait for in-flight work and
    /// release the instance lock.
    pub async fn stop(mut self) -> Result<()> {
        self.lifecycle.begin_stop()?;
        info!("stopping autopilot daemon");

        self.shutdown.trigger();
        self.watcher.take();

        for (name, handle) in self.detectors.drain(..) {
            if let Err(e) = handle.await {
                warn!(detector = name, error = %e, "detector task ended abnormally");
            }
        }

        if let Some(lock) = self.lock.take() {
            lock.release()?;
        }

        self.lifecycle.mark_stopped()?;
        info!("autopilot daemon stopped");
        Ok(())
    }
}
