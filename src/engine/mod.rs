// src/engine/mod.rs

//! Orchestration engine for autopilot (the TriggerEngine).
//!
//! This module ties together:
//! - the daemon lifecycle state machine ([`lifecycle`])
//! - the dispatch table mapping detector conditions to action lists
//!   ([`dispatch`])
//! - the periodic self health-check ([`health`])
//! - the async shell that starts every enabled detector, runs the health
//!   loop and shuts everything down ([`runtime`])
//!
//! Detectors never call the executor directly; they hand a [`Condition`] to
//! the shared [`Dispatcher`].

use std::fmt;

use crate::monitor::Breach;
use crate::types::TriggerKind;

pub mod dispatch;
pub mod health;
pub mod lifecycle;
pub mod runtime;

pub use dispatch::{DispatchReport, DispatchTable, Dispatcher, Route};
pub use health::{current_memory_bytes, HealthReport};
pub use lifecycle::Lifecycle;
pub use runtime::{Daemon, DaemonOptions};

/// `Stopped → Starting → Running → Stopping → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DaemonState::Stopped => "stopped",
            DaemonState::Starting => "starting",
            DaemonState::Running => "running",
            DaemonState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Something a detector observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A debounced batch of changed paths.
    FilesChanged { paths: Vec<String> },
    BulkChange { files: Vec<String> },
    BuildFailure { reason: String },
    CommitLanded { revision: String },
    /// A scheduled task is due; carries its own action list.
    ScheduledTask { task: String, actions: Vec<String> },
    ThresholdBreach(Breach),
}

impl Condition {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Condition::FilesChanged { .. } => TriggerKind::FileChange,
            Condition::BulkChange { .. } => TriggerKind::BulkChange,
            Condition::BuildFailure { .. } => TriggerKind::BuildFailure,
            Condition::CommitLanded { .. } => TriggerKind::CommitHook,
            Condition::ScheduledTask { .. } => TriggerKind::ScheduledTask,
            Condition::ThresholdBreach(_) => TriggerKind::ErrorThreshold,
        }
    }

    /// One-line human description, used as the action message.
    pub fn summary(&self) -> String {
        match self {
            Condition::FilesChanged { paths } => format!("{} file(s) changed", paths.len()),
            Condition::BulkChange { files } => {
                format!("bulk change: {} files changed since baseline", files.len())
            }
            Condition::BuildFailure { reason } => format!("possible build failure: {reason}"),
            Condition::CommitLanded { revision } => format!("new commit {revision}"),
            Condition::ScheduledTask { task, .. } => format!("scheduled task '{task}' is due"),
            Condition::ThresholdBreach(breach) => format!("error threshold breached: {breach}"),
        }
    }

    pub fn files(&self) -> &[String] {
        match self {
            Condition::FilesChanged { paths } => paths,
            Condition::BulkChange { files } => files,
            _ => &[],
        }
    }
}
