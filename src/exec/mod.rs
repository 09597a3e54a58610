// src/exec/mod.rs

//! Action execution layer.
//!
//! - [`runner`] spawns shell commands with a mandatory timeout
//!   (`CommandRunner` trait + production `ShellCommandRunner`).
//! - [`notify`] holds the pluggable notification channels.
//! - [`executor`] owns the `ActionExecutor`: action lookup, per-invocation
//!   retry budget, per-action-name mutual exclusion and failure reporting.

use std::future::Future;
use std::pin::Pin;

pub mod executor;
pub mod notify;
pub mod runner;

/// Boxed future used at the object-safe trait seams of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use executor::{ActionContext, ActionError, ActionExecutor, ActionReport};
pub use notify::{CommandNotifier, LogNotifier, Notifier, NotifierRegistry};
pub use runner::{CommandOutput, CommandRequest, CommandRunner, CommandStatus, ShellCommandRunner};
