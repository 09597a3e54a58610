// src/config/mod.rs

//! Configuration loading and validation for autopilot.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load / create a config file on disk (`loader.rs`).
//! - Validate semantic invariants (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, reload, write_default_if_absent};
pub use validate::{undefined_action_references, warn_on_undefined_actions};
pub use model::{
    ActionKind, ActionSpec, BuildFailureTrigger, BulkChangeTrigger, CategoryLimits,
    ChannelConfig, CommitHookTrigger, ConfigFile, DaemonSection, ErrorThresholdTrigger,
    FileChangeTrigger, NotificationPolicy, RawConfigFile, ScheduledTaskConfig,
    ScheduledTaskTrigger, TriggersSection,
};
