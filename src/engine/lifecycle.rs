// src/engine/lifecycle.rs

use tracing::debug;

use super::DaemonState;
use crate::errors::{AutopilotError, Result};

/// Guards the daemon state machine. Every transition is checked; an invalid
/// one is an error and leaves the state untouched.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: DaemonState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: DaemonState::Stopped,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn begin_start(&mut self) -> Result<()> {
        self.transition(&[DaemonState::Stopped], DaemonState::Starting)
    }

    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(&[DaemonState::Starting], DaemonState::Running)
    }

    /// Also valid from `Starting`, for a start that failed half-way.
    pub fn begin_stop(&mut self) -> Result<()> {
        self.transition(
            &[DaemonState::Starting, DaemonState::Running],
            DaemonState::Stopping,
        )
    }

    pub fn mark_stopped(&mut self) -> Result<()> {
        self.transition(&[DaemonState::Stopping], DaemonState::Stopped)
    }

    fn transition(&mut self, from: &[DaemonState], to: DaemonState) -> Result<()> {
        if !from.contains(&self.state) {
            return Err(AutopilotError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!(from = %self.state, %to, "daemon state transition");
        self.state = to;
        Ok(())
    }
}
