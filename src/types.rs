// src/types.rs

//! Small shared enums used across config, executor and engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Urgency of a notification; selects the channel list in `[notifications]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Medium
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            "critical" => Ok(Urgency::Critical),
            other => Err(format!(
                "invalid urgency: {other} (expected low, medium, high or critical)"
            )),
        }
    }
}

/// The detection condition a trigger is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    FileChange,
    BulkChange,
    BuildFailure,
    CommitHook,
    ScheduledTask,
    ErrorThreshold,
    /// One-shot invocation from the `test` command.
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::FileChange => "file_change",
            TriggerKind::BulkChange => "bulk_change",
            TriggerKind::BuildFailure => "build_failure",
            TriggerKind::CommitHook => "commit_hook",
            TriggerKind::ScheduledTask => "scheduled_task",
            TriggerKind::ErrorThreshold => "error_threshold",
            TriggerKind::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Urgency>(), Ok(Urgency::High));
        assert_eq!(" low ".parse::<Urgency>(), Ok(Urgency::Low));
        assert!("urgent".parse::<Urgency>().is_err());
    }

    #[test]
    fn urgency_orders_by_severity() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::High < Urgency::Critical);
    }
}
