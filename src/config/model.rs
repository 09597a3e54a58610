// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Urgency;

/// Top-level configuration as read from `.autopilot/config.toml`.
///
/// ```toml
/// [daemon]
/// health_check_secs = 5
///
/// [triggers.file_change]
/// watch = ["src/**/*"]
/// debounce_ms = 1000
/// actions = ["lint"]
///
/// [actions.lint]
/// command = "npm run lint"
/// timeout_ms = 120000
/// retries = 1
/// ```
///
/// Every section is optional. `RawConfigFile::default()` is the document
/// written by `autopilot init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub triggers: TriggersSection,

    /// Keyed by action name.
    #[serde(default)]
    pub actions: BTreeMap<String, ActionSpec>,

    #[serde(default)]
    pub notifications: NotificationPolicy,
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            daemon: DaemonSection::default(),
            triggers: TriggersSection::default(),
            actions: default_actions(),
            notifications: NotificationPolicy::default(),
        }
    }
}

/// Validated configuration. Construct via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    raw: RawConfigFile,
}

impl ConfigFile {
    /// Wrap without validation. Only `validate.rs` should call this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self { raw }
    }

    pub fn daemon(&self) -> &DaemonSection {
        &self.raw.daemon
    }

    pub fn triggers(&self) -> &TriggersSection {
        &self.raw.triggers
    }

    pub fn actions(&self) -> &BTreeMap<String, ActionSpec> {
        &self.raw.actions
    }

    pub fn notifications(&self) -> &NotificationPolicy {
        &self.raw.notifications
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }
}

/// `[daemon]` section: engine-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    /// Interval of the engine's self health-check.
    pub health_check_secs: u64,
    /// Soft ceiling for resident memory; exceeding it is logged only.
    pub memory_ceiling_mb: u64,
    /// Fixed wait between attempts of a failing action.
    pub retry_backoff_ms: u64,
    /// How long `autopilot stop` waits for the lock record to disappear.
    pub stop_timeout_secs: u64,
    /// Actions invoked by `autopilot test`.
    pub smoke_test: Vec<String>,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            health_check_secs: 5,
            memory_ceiling_mb: 512,
            retry_backoff_ms: 5_000,
            stop_timeout_secs: 10,
            smoke_test: vec!["lint".to_string(), "typecheck".to_string()],
        }
    }
}

impl DaemonSection {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn memory_ceiling_bytes(&self) -> u64 {
        self.memory_ceiling_mb.saturating_mul(1024 * 1024)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// `[triggers.*]` sections, one per trigger kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersSection {
    pub file_change: FileChangeTrigger,
    pub bulk_change: BulkChangeTrigger,
    pub build_failure: BuildFailureTrigger,
    pub commit_hook: CommitHookTrigger,
    pub scheduled_task: ScheduledTaskTrigger,
    pub error_threshold: ErrorThresholdTrigger,
}

/// `[triggers.file_change]`: debounced batches of edited files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileChangeTrigger {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub urgency: Urgency,
    /// Globs relative to the project root.
    pub watch: Vec<String>,
    pub exclude: Vec<String>,
    pub actions: Vec<String>,
}

impl Default for FileChangeTrigger {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1_000,
            urgency: Urgency::Low,
            watch: vec!["src/**/*".to_string()],
            exclude: vec![
                "**/node_modules/**".to_string(),
                ".git/**".to_string(),
                ".autopilot/**".to_string(),
                "target/**".to_string(),
                "dist/**".to_string(),
            ],
            actions: vec!["lint".to_string()],
        }
    }
}

impl FileChangeTrigger {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// `[triggers.bulk_change]`: many files changed relative to a VCS baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkChangeTrigger {
    pub enabled: bool,
    pub poll_secs: u64,
    pub threshold_count: usize,
    pub time_window_ms: u64,
    /// Revision the working tree is compared against.
    pub baseline: String,
    pub urgency: Urgency,
    pub actions: Vec<String>,
}

impl Default for BulkChangeTrigger {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: 60,
            threshold_count: 10,
            time_window_ms: 300_000,
            baseline: "HEAD~1".to_string(),
            urgency: Urgency::Medium,
            actions: vec!["typecheck".to_string(), "notify_team".to_string()],
        }
    }
}

impl BulkChangeTrigger {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_millis(self.time_window_ms)
    }
}

/// `[triggers.build_failure]`: build output missing or stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildFailureTrigger {
    pub enabled: bool,
    pub poll_secs: u64,
    /// Expected build output, relative to the project root.
    pub output_path: String,
    /// Output older than this counts as failed; unset means presence only.
    pub max_age_secs: Option<u64>,
    pub auto_recovery: bool,
    /// Action re-run after a successful fix step.
    pub build_action: String,
    /// Actions that are fix-then-rebuild steps.
    pub fix_actions: Vec<String>,
    pub urgency: Urgency,
    pub actions: Vec<String>,
}

impl Default for BuildFailureTrigger {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_secs: 300,
            output_path: "dist".to_string(),
            max_age_secs: None,
            auto_recovery: true,
            build_action: "build".to_string(),
            fix_actions: vec!["lint_fix".to_string()],
            urgency: Urgency::High,
            actions: vec!["lint_fix".to_string(), "notify_team".to_string()],
        }
    }
}

impl BuildFailureTrigger {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

/// `[triggers.commit_hook]`: a new head revision appeared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitHookTrigger {
    pub enabled: bool,
    pub poll_secs: u64,
    pub urgency: Urgency,
    pub actions: Vec<String>,
}

impl Default for CommitHookTrigger {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_secs: 30,
            urgency: Urgency::Low,
            actions: vec!["typecheck".to_string()],
        }
    }
}

impl CommitHookTrigger {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
}

/// `[triggers.scheduled_task]`: calendar-like rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduledTaskTrigger {
    pub enabled: bool,
    pub tick_secs: u64,
    pub urgency: Urgency,
    /// Keyed by task name.
    pub tasks: BTreeMap<String, ScheduledTaskConfig>,
}

impl Default for ScheduledTaskTrigger {
    fn default() -> Self {
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "typecheck_sweep".to_string(),
            ScheduledTaskConfig {
                schedule: "every 6h".to_string(),
                actions: vec!["typecheck".to_string()],
            },
        );
        tasks.insert(
            "dependency_audit".to_string(),
            ScheduledTaskConfig {
                schedule: "weekly mon 09:00".to_string(),
                actions: vec!["audit".to_string()],
            },
        );
        Self {
            enabled: true,
            tick_secs: 300,
            urgency: Urgency::Low,
            tasks,
        }
    }
}

impl ScheduledTaskTrigger {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// `[triggers.scheduled_task.tasks.<name>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTaskConfig {
    /// `every <N>h`, `daily <HH:MM>` or `weekly <day> <HH:MM>`.
    pub schedule: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// `[triggers.error_threshold]`: rolling per-category error counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorThresholdTrigger {
    pub enabled: bool,
    pub evaluate_secs: u64,
    pub urgency: Urgency,
    pub actions: Vec<String>,
    /// Keyed by error category.
    pub categories: BTreeMap<String, CategoryLimits>,
}

impl Default for ErrorThresholdTrigger {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            "build".to_string(),
            CategoryLimits {
                hourly_limit: Some(3),
                daily_limit: Some(10),
            },
        );
        categories.insert(
            "lint".to_string(),
            CategoryLimits {
                hourly_limit: Some(10),
                daily_limit: Some(50),
            },
        );
        Self {
            enabled: true,
            evaluate_secs: 300,
            urgency: Urgency::Critical,
            actions: vec!["notify_team".to_string()],
            categories,
        }
    }
}

impl ErrorThresholdTrigger {
    pub fn evaluate_interval(&self) -> Duration {
        Duration::from_secs(self.evaluate_secs)
    }
}

/// Per-category limits; a breach is `count > limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLimits {
    #[serde(default)]
    pub hourly_limit: Option<u32>,
    #[serde(default)]
    pub daily_limit: Option<u32>,
}

/// `[actions.<name>]`.
///
/// Exactly one of `command` (external command run through the shell) or
/// `notify` (built-in notifier with a default urgency) must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub notify: Option<Urgency>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra attempts after the first failure, per invocation.
    #[serde(default)]
    pub retries: u32,

    /// Error category reported when the action finally fails.
    #[serde(default)]
    pub category: Option<String>,
}

fn default_timeout_ms() -> u64 {
    60_000
}

/// Borrowed view of what an action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind<'a> {
    Command(&'a str),
    Notify(Urgency),
}

impl ActionSpec {
    pub fn command(command: impl Into<String>, timeout_ms: u64, retries: u32) -> Self {
        Self {
            command: Some(command.into()),
            notify: None,
            timeout_ms,
            retries,
            category: None,
        }
    }

    pub fn notification(urgency: Urgency, timeout_ms: u64, retries: u32) -> Self {
        Self {
            command: None,
            notify: Some(urgency),
            timeout_ms,
            retries,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn kind(&self) -> ActionKind<'_> {
        match (&self.command, self.notify) {
            (Some(cmd), _) => ActionKind::Command(cmd.as_str()),
            (None, urgency) => ActionKind::Notify(urgency.unwrap_or_default()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_actions() -> BTreeMap<String, ActionSpec> {
    let mut actions = BTreeMap::new();
    actions.insert(
        "lint".to_string(),
        ActionSpec::command("npm run lint", 120_000, 1).with_category("lint"),
    );
    actions.insert(
        "lint_fix".to_string(),
        ActionSpec::command("npm run lint -- --fix", 120_000, 0).with_category("lint"),
    );
    actions.insert(
        "typecheck".to_string(),
        ActionSpec::command("npx tsc --noEmit", 180_000, 1).with_category("typecheck"),
    );
    actions.insert(
        "build".to_string(),
        ActionSpec::command("npm run build", 600_000, 1).with_category("build"),
    );
    actions.insert(
        "audit".to_string(),
        ActionSpec::command("npm audit --audit-level=high", 120_000, 2),
    );
    actions.insert(
        "notify_team".to_string(),
        ActionSpec::notification(Urgency::High, 10_000, 2),
    );
    actions
}

/// `[notifications]`: urgency level -> ordered channel list.
///
/// The `log` channel is built in; other channels are declared under
/// `[notifications.channels.<name>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    pub low: Vec<String>,
    pub medium: Vec<String>,
    pub high: Vec<String>,
    pub critical: Vec<String>,
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        let log = vec!["log".to_string()];
        Self {
            low: log.clone(),
            medium: log.clone(),
            high: log.clone(),
            critical: log,
            channels: BTreeMap::new(),
        }
    }
}

impl NotificationPolicy {
    pub fn channels_for(&self, urgency: Urgency) -> &[String] {
        match urgency {
            Urgency::Low => &self.low,
            Urgency::Medium => &self.medium,
            Urgency::High => &self.high,
            Urgency::Critical => &self.critical,
        }
    }
}

/// A notification channel backed by an external command.
///
/// The message and urgency are exported as `AUTOPILOT_MESSAGE` and
/// `AUTOPILOT_URGENCY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub command: String,
    #[serde(default = "default_channel_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_channel_timeout_ms() -> u64 {
    10_000
}
