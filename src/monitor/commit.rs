// src/monitor/commit.rs

//! CommitWatcher: fires the CommitHook actions when the head revision moves.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::vcs::ChangeSource;
use crate::config::CommitHookTrigger;
use crate::engine::{Condition, Dispatcher};
use crate::shutdown::ShutdownToken;

/// Remembers the last head revision seen. The first observation only seeds
/// the tracker.
#[derive(Debug, Clone, Default)]
pub struct CommitTracker {
    last_seen: Option<String>,
}

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    /// Returns the new revision when it differs from the previous one.
    pub fn observe(&mut self, revision: &str) -> Option<String> {
        let previous = self.last_seen.replace(revision.to_string());
        match previous {
            Some(prev) if prev != revision => Some(revision.to_string()),
            _ => None,
        }
    }
}

pub struct CommitWatcher {
    tracker: CommitTracker,
    source: Arc<dyn ChangeSource>,
    poll_interval: Duration,
    dispatcher: Dispatcher,
}

impl CommitWatcher {
    pub fn new(config: &CommitHookTrigger, source: Arc<dyn ChangeSource>, dispatcher: Dispatcher) -> Self {
        Self {
            tracker: CommitTracker::new(),
            source,
            poll_interval: config.poll_interval(),
            dispatcher,
        }
    }

    pub async fn poll_once(&mut self) {
        let revision = match self.source.head_revision().await {
            Ok(rev) => rev,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "head revision query failed");
                return;
            }
        };

        match self.tracker.observe(&revision) {
            Some(revision) => {
                info!(%revision, "new commit detected");
                self.dispatcher.fire(Condition::CommitLanded { revision }).await;
            }
            None => debug!(%revision, "head unchanged"),
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_secs = self.poll_interval.as_secs(), "commit watcher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }

        info!("commit watcher stopped");
    }
}
