// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::watch::batcher::FileEvent;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::WatchProfile;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// closes the OS watch and ends the forwarding task.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a recursive watcher on `root` that forwards matching events to the
/// change batcher.
///
/// - `profile` filters relative paths (`watch` minus `exclude`).
/// - Access events are ignored; removals and rename sources become
///   [`FileEvent::removed`], everything else [`FileEvent::modified`].
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    profile: WatchProfile,
    batcher_tx: mpsc::UnboundedSender<FileEvent>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("autopilot: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("autopilot: file watch error: {err}");
            }
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", root.display()))?;

    info!(root = %root.display(), "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            let at = Instant::now();
            for file_event in translate(&root, &profile, &event, at) {
                if batcher_tx.send(file_event).is_err() {
                    warn!("change batcher gone; stopping watcher forwarding");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// Map one notify event to zero or more batcher events.
pub fn translate(root: &Path, profile: &WatchProfile, event: &Event, at: Instant) -> Vec<FileEvent> {
    let mut out = Vec::new();

    for (idx, path) in event.paths.iter().enumerate() {
        let removed = match event.kind {
            EventKind::Access(_) => continue,
            EventKind::Remove(_) => true,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => true,
            // `Both` carries [from, to].
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => idx == 0,
            _ => false,
        };

        if !removed && path.is_dir() {
            continue;
        }

        let Some(rel) = relative_str(root, path) else {
            continue;
        };
        if !profile.matches(&rel) {
            continue;
        }

        out.push(if removed {
            FileEvent::removed(rel, at)
        } else {
            FileEvent::modified(rel, at)
        });
    }

    out
}
