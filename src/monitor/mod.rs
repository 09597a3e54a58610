// src/monitor/mod.rs

//! Polling detectors.
//!
//! Each detector is split into a pure, synchronous core that owns its
//! runtime state (history, counters, last-fired markers) and a small async
//! loop that drives it from a fixed-interval timer, observes the shared
//! [`ShutdownToken`](crate::shutdown::ShutdownToken) at every tick, and
//! hands conditions to the engine's dispatcher.
//!
//! - [`bulk_change`]: many files changed vs. a VCS baseline, at most once per window.
//! - [`build_health`]: build output missing/stale, with optional fix-then-rebuild.
//! - [`commit`]: head revision moved.
//! - [`threshold`]: per-category hourly/daily error counters.
//! - [`schedule`]: calendar-like scheduled tasks.
//! - [`vcs`]: the version-control query used by the above.

pub mod build_health;
pub mod bulk_change;
pub mod commit;
pub mod schedule;
pub mod threshold;
pub mod vcs;

pub use build_health::{BuildHealthMonitor, BuildOutputState, RecoveryOutcome};
pub use bulk_change::{BulkChangeDetector, BulkChangeHistory};
pub use commit::{CommitTracker, CommitWatcher};
pub use schedule::{Cadence, DueTask, TaskScheduler};
pub use threshold::{Breach, BreachWindow, ErrorCounters, ErrorReporter, ResetClock, ThresholdMonitor};
pub use vcs::{ChangeSource, GitChangeSource};
