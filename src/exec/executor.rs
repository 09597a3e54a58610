// src/exec/executor.rs

//! The `ActionExecutor`: the single execution path every detector funnels
//! into.
//!
//! Semantics:
//! - Actions are looked up by name in the current action table; an unknown
//!   name is a logged `UnknownAction` failure, never a crash.
//! - The table is re-read from the config file before each invocation. If
//!   the file is unreadable or invalid the last good table is kept.
//! - Each invocation gets a fresh retry budget of `retries` extra attempts
//!   (so at most `retries + 1` attempts), with a fixed backoff in between.
//!   Nothing in the shared table is mutated.
//! - Invocations of the *same* action name are serialized; distinct names
//!   run independently.
//! - When an action finally fails, its error category is reported to the
//!   threshold monitor (if wired).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::notify::{Notifier, NotifierRegistry};
use super::runner::{CommandRequest, CommandRunner, CommandStatus};
use crate::config::{reload, ActionKind, ActionSpec, ConfigFile, NotificationPolicy};
use crate::monitor::threshold::ErrorReporter;
use crate::types::{TriggerKind, Urgency};

/// Why an action failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{name}' timed out after {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("action '{name}' exited with code {code}")]
    NonZeroExit { name: String, code: i32 },

    #[error("action '{name}' could not be run: {reason}")]
    Spawn { name: String, reason: String },

    #[error("action '{name}': no channel accepted the notification ({})", .failures.join("; "))]
    Notification { name: String, failures: Vec<String> },

    #[error("action '{name}': no notification channels configured for urgency '{urgency}'")]
    NoChannels { name: String, urgency: Urgency },
}

/// What the firing detector knows about the condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub trigger: TriggerKind,
    /// Overrides a notification action's default urgency.
    pub urgency: Option<Urgency>,
    pub message: String,
    pub files: Vec<String>,
}

impl ActionContext {
    pub fn new(trigger: TriggerKind, message: impl Into<String>) -> Self {
        Self {
            trigger,
            urgency: None,
            message: message.into(),
            files: Vec::new(),
        }
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    fn apply_env(&self, request: CommandRequest) -> CommandRequest {
        request
            .with_env("AUTOPILOT_TRIGGER", self.trigger.as_str())
            .with_env("AUTOPILOT_MESSAGE", self.message.clone())
            .with_env("AUTOPILOT_FILES", self.files.join("\n"))
    }
}

/// Successful invocation summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionReport {
    pub attempts: u32,
}

/// Immutable snapshot of everything loaded from the config file.
#[derive(Debug)]
struct ActionTable {
    actions: BTreeMap<String, ActionSpec>,
    policy: NotificationPolicy,
    notifiers: NotifierRegistry,
}

impl ActionTable {
    fn from_config(config: &ConfigFile, runner: &Arc<dyn CommandRunner>) -> Self {
        Self {
            actions: config.actions().clone(),
            policy: config.notifications().clone(),
            notifiers: NotifierRegistry::from_policy(config.notifications(), Arc::clone(runner)),
        }
    }
}

pub struct ActionExecutor {
    table: RwLock<Arc<ActionTable>>,
    /// Re-read before each invocation when set.
    config_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
    /// Injected channels; take precedence over configured ones.
    extra_notifiers: HashMap<String, Arc<dyn Notifier>>,
    retry_backoff: Duration,
    /// One mutex per action name.
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    errors: Option<ErrorReporter>,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("config_path", &self.config_path)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    pub fn new(config: &ConfigFile, runner: Arc<dyn CommandRunner>) -> Self {
        let table = ActionTable::from_config(config, &runner);
        Self {
            table: RwLock::new(Arc::new(table)),
            config_path: None,
            runner,
            extra_notifiers: HashMap::new(),
            retry_backoff: config.daemon().retry_backoff(),
            slots: Mutex::new(HashMap::new()),
            errors: None,
        }
    }

    /// Reload the action table from `path` before every invocation.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_notifier(mut self, channel: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        self.extra_notifiers.insert(channel.into(), notifier);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.errors = Some(reporter);
        self
    }

    /// Run the named action with its retry budget.
    pub async fn execute(&self, name: &str, ctx: &ActionContext) -> Result<ActionReport, ActionError> {
        let slot = self.slot_for(name);
        let _exclusive = slot.lock().await;

        self.refresh().await;
        let table = self.snapshot();

        let Some(spec) = table.actions.get(name).cloned() else {
            warn!(action = %name, trigger = %ctx.trigger, "unknown action; skipping");
            return Err(ActionError::UnknownAction(name.to_string()));
        };

        let budget = spec.retries;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(action = %name, attempt, trigger = %ctx.trigger, "running action");

            match self.attempt(name, &spec, &table, ctx).await {
                Ok(()) => {
                    info!(action = %name, attempt, trigger = %ctx.trigger, "action succeeded");
                    return Ok(ActionReport { attempts: attempt });
                }
                Err(err) if attempt <= budget => {
                    warn!(
                        action = %name,
                        attempt,
                        remaining_retries = budget + 1 - attempt,
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        error = %err,
                        "action failed; retrying"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => {
                    error!(
                        action = %name,
                        attempts = attempt,
                        trigger = %ctx.trigger,
                        error = %err,
                        "action failed; retries exhausted"
                    );
                    if let Some(reporter) = &self.errors {
                        reporter.report(spec.category.as_deref().unwrap_or(name));
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        name: &str,
        spec: &ActionSpec,
        table: &ActionTable,
        ctx: &ActionContext,
    ) -> Result<(), ActionError> {
        match spec.kind() {
            ActionKind::Command(command) => {
                let request = ctx.apply_env(CommandRequest::new(command, spec.timeout()));
                let output = self.runner.run(request).await.map_err(|e| ActionError::Spawn {
                    name: name.to_string(),
                    reason: format!("{e:#}"),
                })?;
                match output.status {
                    CommandStatus::Success => Ok(()),
                    CommandStatus::Failed(code) => Err(ActionError::NonZeroExit {
                        name: name.to_string(),
                        code,
                    }),
                    CommandStatus::TimedOut => Err(ActionError::Timeout {
                        name: name.to_string(),
                        timeout_ms: spec.timeout_ms,
                    }),
                }
            }
            ActionKind::Notify(default_urgency) => {
                let urgency = ctx.urgency.unwrap_or(default_urgency);
                self.notify(name, spec.timeout(), urgency, table, ctx).await
            }
        }
    }

    /// Fan out to every channel for `urgency`; success if any accepted.
    async fn notify(
        &self,
        name: &str,
        timeout: Duration,
        urgency: Urgency,
        table: &ActionTable,
        ctx: &ActionContext,
    ) -> Result<(), ActionError> {
        let channels = table.policy.channels_for(urgency);
        if channels.is_empty() {
            return Err(ActionError::NoChannels {
                name: name.to_string(),
                urgency,
            });
        }

        let message = format!("[{}] {}", ctx.trigger, ctx.message);
        let mut accepted = 0usize;
        let mut failures = Vec::new();

        for channel in channels {
            let notifier = self
                .extra_notifiers
                .get(channel)
                .cloned()
                .or_else(|| table.notifiers.get(channel));
            let Some(notifier) = notifier else {
                failures.push(format!("{channel}: unknown channel"));
                continue;
            };

            match tokio::time::timeout(timeout, notifier.send(channel, &message, urgency)).await {
                Ok(Ok(())) => accepted += 1,
                Ok(Err(e)) => failures.push(format!("{channel}: {e:#}")),
                Err(_) => failures.push(format!("{channel}: timed out")),
            }
        }

        if !failures.is_empty() {
            warn!(action = %name, %urgency, ?failures, "some notification channels failed");
        }

        if accepted > 0 {
            Ok(())
        } else {
            Err(ActionError::Notification {
                name: name.to_string(),
                failures,
            })
        }
    }

    fn slot_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(slots.entry(name.to_string()).or_default())
    }

    fn snapshot(&self) -> Arc<ActionTable> {
        let guard = self.table.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    /// Pick up hand edits to the config file.
    async fn refresh(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        match reload(path.clone()).await {
            Ok(config) => {
                let table = ActionTable::from_config(&config, &self.runner);
                let mut guard = self.table.write().unwrap_or_else(|p| p.into_inner());
                *guard = Arc::new(table);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config reload failed; keeping last good action table");
            }
        }
    }
}
