#![allow(dead_code)]

use std::path::Path;

use autopilot::config::{
    ActionSpec, BuildFailureTrigger, BulkChangeTrigger, CommitHookTrigger, ConfigFile,
    DaemonSection, ErrorThresholdTrigger, FileChangeTrigger, NotificationPolicy, RawConfigFile,
    ScheduledTaskConfig, ScheduledTaskTrigger,
};
use autopilot::paths::ProjectPaths;
use autopilot::types::Urgency;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with every trigger disabled, no actions and no
/// scheduled tasks, so each test opts into exactly what it exercises.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.actions.clear();
        config.daemon.smoke_test.clear();
        config.daemon.retry_backoff_ms = 10;

        let t = &mut config.triggers;
        t.file_change.enabled = false;
        t.bulk_change.enabled = false;
        t.build_failure.enabled = false;
        t.commit_hook.enabled = false;
        t.scheduled_task.enabled = false;
        t.scheduled_task.tasks.clear();
        t.error_threshold.enabled = false;

        Self { config }
    }

    pub fn action(mut self, name: &str, spec: ActionSpec) -> Self {
        self.config.actions.insert(name.to_string(), spec);
        self
    }

    /// Command action with a 5s timeout.
    pub fn command(self, name: &str, command: &str, retries: u32) -> Self {
        self.action(name, ActionSpec::command(command, 5_000, retries))
    }

    pub fn notification(self, name: &str, urgency: Urgency) -> Self {
        self.action(name, ActionSpec::notification(urgency, 1_000, 0))
    }

    pub fn daemon(mut self, f: impl FnOnce(&mut DaemonSection)) -> Self {
        f(&mut self.config.daemon);
        self
    }

    pub fn notifications(mut self, f: impl FnOnce(&mut NotificationPolicy)) -> Self {
        f(&mut self.config.notifications);
        self
    }

    /// Enables the trigger, then applies `f`.
    pub fn file_change(mut self, f: impl FnOnce(&mut FileChangeTrigger)) -> Self {
        self.config.triggers.file_change.enabled = true;
        f(&mut self.config.triggers.file_change);
        self
    }

    pub fn bulk_change(mut self, f: impl FnOnce(&mut BulkChangeTrigger)) -> Self {
        self.config.triggers.bulk_change.enabled = true;
        f(&mut self.config.triggers.bulk_change);
        self
    }

    pub fn build_failure(mut self, f: impl FnOnce(&mut BuildFailureTrigger)) -> Self {
        self.config.triggers.build_failure.enabled = true;
        f(&mut self.config.triggers.build_failure);
        self
    }

    pub fn commit_hook(mut self, f: impl FnOnce(&mut CommitHookTrigger)) -> Self {
        self.config.triggers.commit_hook.enabled = true;
        f(&mut self.config.triggers.commit_hook);
        self
    }

    pub fn error_threshold(mut self, f: impl FnOnce(&mut ErrorThresholdTrigger)) -> Self {
        self.config.triggers.error_threshold.enabled = true;
        f(&mut self.config.triggers.error_threshold);
        self
    }

    pub fn scheduled(mut self, name: &str, schedule: &str, actions: &[&str]) -> Self {
        let t: &mut ScheduledTaskTrigger = &mut self.config.triggers.scheduled_task;
        t.enabled = true;
        t.tasks.insert(
            name.to_string(),
            ScheduledTaskConfig {
                schedule: schedule.to_string(),
                actions: actions.iter().map(|a| a.to_string()).collect(),
            },
        );
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// Write the config to `<root>/.autopilot/config.toml` and return it.
    pub fn write_to(self, root: &Path) -> ConfigFile {
        let paths = ProjectPaths::new(root);
        std::fs::create_dir_all(paths.state_dir()).expect("create state dir");
        let text = toml::to_string_pretty(&self.config).expect("serialize config");
        std::fs::write(paths.config_file(), text).expect("write config");
        self.build()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
