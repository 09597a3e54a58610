// src/exec/notify.rs

//! Pluggable notification channels.
//!
//! A channel is anything implementing [`Notifier`]. The built-in `log`
//! channel writes a tracing event; `[notifications.channels.<name>]` entries
//! become [`CommandNotifier`]s. Tests inject their own implementations via
//! `ActionExecutor::with_notifier`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::info;

use super::runner::{CommandRequest, CommandRunner, CommandStatus};
use super::BoxFuture;
use crate::config::NotificationPolicy;
use crate::types::Urgency;

/// Name of the channel that always exists.
pub const BUILTIN_LOG_CHANNEL: &str = "log";

/// A notification transport.
pub trait Notifier: Send + Sync {
    /// Deliver `message`; `Ok` means the transport accepted it.
    fn send<'a>(
        &'a self,
        channel: &'a str,
        message: &'a str,
        urgency: Urgency,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Writes notifications into the daemon log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(
        &'a self,
        channel: &'a str,
        message: &'a str,
        urgency: Urgency,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            info!(target: "autopilot::notify", channel, %urgency, "{}", message);
            Ok(())
        })
    }
}

/// Delivers notifications by running an external command.
pub struct CommandNotifier {
    command: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>, timeout: Duration, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            command: command.into(),
            timeout,
            runner,
        }
    }
}

impl fmt::Debug for CommandNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandNotifier")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Notifier for CommandNotifier {
    fn send<'a>(
        &'a self,
        channel: &'a str,
        message: &'a str,
        urgency: Urgency,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = CommandRequest::new(self.command.clone(), self.timeout)
                .with_env("AUTOPILOT_CHANNEL", channel)
                .with_env("AUTOPILOT_MESSAGE", message)
                .with_env("AUTOPILOT_URGENCY", urgency.to_string());
            let output = self.runner.run(request).await?;
            match output.status {
                CommandStatus::Success => Ok(()),
                CommandStatus::Failed(code) => {
                    bail!("channel '{channel}' command exited with code {code}")
                }
                CommandStatus::TimedOut => bail!("channel '{channel}' command timed out"),
            }
        })
    }
}

/// Channel name -> transport.
#[derive(Clone, Default)]
pub struct NotifierRegistry {
    channels: HashMap<String, Arc<dyn Notifier>>,
}

impl fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.channels.keys().collect();
        names.sort();
        f.debug_struct("NotifierRegistry")
            .field("channels", &names)
            .finish()
    }
}

impl NotifierRegistry {
    /// Built-in `log` channel plus one command channel per configured entry.
    pub fn from_policy(policy: &NotificationPolicy, runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = Self::default();
        registry.insert(BUILTIN_LOG_CHANNEL, Arc::new(LogNotifier));
        for (name, channel) in policy.channels.iter() {
            registry.insert(
                name.clone(),
                Arc::new(CommandNotifier::new(
                    channel.command.clone(),
                    Duration::from_millis(channel.timeout_ms),
                    Arc::clone(&runner),
                )),
            );
        }
        registry
    }

    pub fn insert(&mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) {
        self.channels.insert(name.into(), notifier);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        self.channels.get(name).cloned()
    }
}
