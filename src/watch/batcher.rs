// src/watch/batcher.rs

//! ChangeBatcher: debounces individual file events into batches of unique
//! paths.
//!
//! Every modification inserts its path into the [`ChangeBuffer`] and pushes
//! the flush deadline to `event time + debounce`. When the deadline passes
//! the buffer is drained into one `FilesChanged` condition. Removals drop a
//! path from the pending buffer but never start a cycle themselves.
//!
//! The flush is awaited inline, so at most one batch is being handled at a
//! time. Events that arrive meanwhile wait in the channel and start the next
//! cycle.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::engine::{Condition, Dispatcher};
use crate::shutdown::ShutdownToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Removed,
}

/// A single filtered filesystem event, path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: String,
    pub kind: ChangeKind,
    pub at: Instant,
}

impl FileEvent {
    pub fn modified(path: impl Into<String>, at: Instant) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified,
            at,
        }
    }

    pub fn removed(path: impl Into<String>, at: Instant) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Removed,
            at,
        }
    }
}

/// Pending paths plus the current flush deadline.
#[derive(Debug, Clone)]
pub struct ChangeBuffer {
    pending: BTreeSet<String>,
    deadline: Option<Instant>,
    debounce: Duration,
}

impl ChangeBuffer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            deadline: None,
            debounce,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn record(&mut self, event: &FileEvent) {
        match event.kind {
            ChangeKind::Modified => {
                self.pending.insert(event.path.clone());
                self.deadline = Some(event.at + self.debounce);
            }
            ChangeKind::Removed => {
                self.pending.remove(&event.path);
                if self.pending.is_empty() {
                    self.deadline = None;
                }
            }
        }
    }

    /// Drain the buffer if the deadline has passed. Paths come back sorted.
    pub fn flush_due(&mut self, now: Instant) -> Option<Vec<String>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending).into_iter().collect())
    }
}

pub struct ChangeBatcher {
    buffer: ChangeBuffer,
    events: mpsc::UnboundedReceiver<FileEvent>,
    dispatcher: Dispatcher,
}

impl ChangeBatcher {
    pub fn new(
        debounce: Duration,
        events: mpsc::UnboundedReceiver<FileEvent>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            buffer: ChangeBuffer::new(debounce),
            events,
            dispatcher,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        info!(debounce_ms = self.buffer.debounce.as_millis() as u64, "change batcher started");

        loop {
            let deadline = self.buffer.deadline();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe_event = self.events.recv() => {
                    let Some(event) = maybe_event else {
                        debug!("file event channel closed");
                        break;
                    };
                    debug!(path = %event.path, kind = ?event.kind, "file event");
                    self.buffer.record(&event);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(paths) = self.buffer.flush_due(Instant::now()) {
                        info!(count = paths.len(), "flushing change batch");
                        self.dispatcher.fire(Condition::FilesChanged { paths }).await;
                    }
                }
            }
        }

        if !self.buffer.is_empty() {
            debug!(dropped = self.buffer.len(), "discarding pending changes on shutdown");
        }
        info!("change batcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(1000);

    #[test]
    fn burst_coalesces_into_one_sorted_batch() {
        let mut buf = ChangeBuffer::new(DEBOUNCE);
        let t0 = Instant::now();
        for (i, p) in ["src/b.ts", "src/a.ts", "src/b.ts", "src/c.ts"].iter().enumerate() {
            let at = t0 + Duration::from_millis(100 * i as u64);
            assert!(buf.flush_due(at).is_none());
            buf.record(&FileEvent::modified(*p, at));
        }

        let last = t0 + Duration::from_millis(300);
        assert!(buf.flush_due(last + DEBOUNCE - Duration::from_millis(1)).is_none());
        assert_eq!(
            buf.flush_due(last + DEBOUNCE),
            Some(vec!["src/a.ts".to_string(), "src/b.ts".into(), "src/c.ts".into()])
        );
        assert!(buf.is_empty());
        assert!(buf.deadline().is_none());
    }

    #[test]
    fn removal_drops_pending_path_without_rearming() {
        let mut buf = ChangeBuffer::new(DEBOUNCE);
        let t0 = Instant::now();
        buf.record(&FileEvent::modified("src/a.ts", t0));
        buf.record(&FileEvent::modified("src/b.ts", t0));
        buf.record(&FileEvent::removed("src/a.ts", t0 + Duration::from_millis(500)));

        assert_eq!(buf.deadline(), Some(t0 + DEBOUNCE));
        assert_eq!(buf.flush_due(t0 + DEBOUNCE), Some(vec!["src/b.ts".to_string()]));
    }

    #[test]
    fn removal_alone_never_starts_a_cycle() {
        let mut buf = ChangeBuffer::new(DEBOUNCE);
        let t0 = Instant::now();
        buf.record(&FileEvent::removed("src/a.ts", t0));
        assert!(buf.deadline().is_none());

        buf.record(&FileEvent::modified("src/a.ts", t0));
        buf.record(&FileEvent::removed("src/a.ts", t0));
        assert!(buf.deadline().is_none());
        assert!(buf.flush_due(t0 + DEBOUNCE * 2).is_none());
    }
}
