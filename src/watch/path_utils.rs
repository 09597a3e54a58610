// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::Path;

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// Tries a direct `strip_prefix(root)` first, then again on canonicalized
/// paths (symlinked roots, `/private/var` on macOS). A path that no longer
/// exists can only take the first route.
///
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return non_empty(rel);
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return non_empty(rel);
        }
    }

    None
}

fn non_empty(rel: &Path) -> Option<String> {
    let s = rel.to_string_lossy().replace('\\', "/");
    if s.is_empty() { None } else { Some(s) }
}
