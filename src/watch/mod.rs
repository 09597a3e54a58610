// src/watch/mod.rs

//! File watching and change batching.
//!
//! This module is responsible for:
//! - Compiling the file-change trigger's `watch` / `exclude` glob patterns.
//! - Wiring up a cross-platform filesystem watcher (`notify`) that forwards
//!   filtered events.
//! - Debouncing those events into batches of unique paths (`ChangeBatcher`).
//!
//! It does **not** know which actions run for a batch; it only hands a
//! `FilesChanged` condition to the engine's dispatcher.

pub mod batcher;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use batcher::{ChangeBatcher, ChangeBuffer, ChangeKind, FileEvent};
pub use patterns::WatchProfile;
pub use watcher::{spawn_watcher, WatcherHandle};
