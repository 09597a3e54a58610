// src/watch/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::FileChangeTrigger;

/// Compiled `watch` / `exclude` glob patterns for the file-change trigger.
///
/// Patterns are relative to the project root; the watcher passes relative,
/// forward-slash paths (e.g. `"src/app.ts"`) into [`WatchProfile::matches`].
#[derive(Clone)]
pub struct WatchProfile {
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
    pattern_count: usize,
}

impl fmt::Debug for WatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchProfile")
            .field("pattern_count", &self.pattern_count)
            .finish_non_exhaustive()
    }
}

impl WatchProfile {
    pub fn new(watch: &[String], exclude: &[String]) -> Result<Self> {
        let watch_set = build_globset(watch).context("building watch globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };

        Ok(Self {
            watch_set,
            exclude_set,
            pattern_count: watch.len() + exclude.len(),
        })
    }

    pub fn from_config(trigger: &FileChangeTrigger) -> Result<Self> {
        Self::new(&trigger.watch, &trigger.exclude)
    }

    /// Whether a relative path is watched and not excluded.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
