// src/monitor/bulk_change.rs

//! BulkChangeDetector: raises at most one bulk-change condition per time
//! window when the VCS reports many changed files.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::vcs::ChangeSource;
use crate::config::BulkChangeTrigger;
use crate::engine::{Condition, Dispatcher};
use crate::shutdown::ShutdownToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkChangeEntry {
    pub at: Instant,
    pub files: Vec<String>,
}

/// Firings inside the active window. A non-empty history means the current
/// window already raised its condition.
#[derive(Debug, Clone)]
pub struct BulkChangeHistory {
    entries: VecDeque<BulkChangeEntry>,
    threshold: usize,
    window: Duration,
}

impl BulkChangeHistory {
    pub fn new(threshold: usize, window: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            threshold,
            window,
        }
    }

    pub fn from_config(config: &BulkChangeTrigger) -> Self {
        Self::new(config.threshold_count, config.time_window())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries that are `window` or more old.
    pub fn prune(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.at) >= self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a poll result. Returns the file list to fire with, if any.
    pub fn evaluate(&mut self, now: Instant, files: &[String]) -> Option<Vec<String>> {
        self.prune(now);

        if files.len() < self.threshold || !self.entries.is_empty() {
            return None;
        }

        self.entries.push_back(BulkChangeEntry {
            at: now,
            files: files.to_vec(),
        });
        Some(files.to_vec())
    }
}

pub struct BulkChangeDetector {
    history: BulkChangeHistory,
    source: Arc<dyn ChangeSource>,
    poll_interval: Duration,
    dispatcher: Dispatcher,
}

impl BulkChangeDetector {
    pub fn new(config: &BulkChangeTrigger, source: Arc<dyn ChangeSource>, dispatcher: Dispatcher) -> Self {
        Self {
            history: BulkChangeHistory::from_config(config),
            source,
            poll_interval: config.poll_interval(),
            dispatcher,
        }
    }

    /// One poll: query, evaluate, dispatch.
    pub async fn poll_once(&mut self) {
        let files = match self.source.changed_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "bulk change poll failed");
                return;
            }
        };

        debug!(changed = files.len(), "bulk change poll");
        if let Some(files) = self.history.evaluate(Instant::now(), &files) {
            info!(changed = files.len(), "bulk change detected");
            self.dispatcher.fire(Condition::BulkChange { files }).await;
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_secs = self.poll_interval.as_secs(),
            threshold = self.history.threshold,
            "bulk change detector started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }

        info!("bulk change detector stopped");
    }
}
