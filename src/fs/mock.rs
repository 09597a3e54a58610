// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: SystemTime },
    Dir { modified: SystemTime },
}

impl MockEntry {
    fn modified(&self) -> SystemTime {
        match self {
            MockEntry::File { modified, .. } | MockEntry::Dir { modified } => *modified,
        }
    }
}

/// In-memory filesystem. Parent directories are created implicitly.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_at(path, content, SystemTime::now());
    }

    /// Add a file with an explicit modification time (for freshness checks).
    pub fn add_file_at(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        let path = path.as_ref();
        let mut entries = self.entries.lock().unwrap();
        if let Some(parent) = path.parent() {
            Self::ensure_dirs(&mut entries, parent, modified);
        }
        entries.insert(
            path.to_path_buf(),
            MockEntry::File {
                content: content.into(),
                modified,
            },
        );
    }

    pub fn add_dir_at(&self, path: impl AsRef<Path>, modified: SystemTime) {
        let mut entries = self.entries.lock().unwrap();
        Self::ensure_dirs(&mut entries, path.as_ref(), modified);
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|p, _| !p.starts_with(path));
    }

    fn ensure_dirs(entries: &mut HashMap<PathBuf, MockEntry>, dir: &Path, modified: SystemTime) {
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir { modified });
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let entries = self.entries.lock().unwrap();
        match entries.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(
            self.entries.lock().unwrap().get(path),
            Some(MockEntry::Dir { .. })
        )
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir_at(path, SystemTime::now());
        Ok(())
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .map(MockEntry::modified)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn adding_a_file_creates_its_parents() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/dist/index.js", "x");
        assert!(fs.is_dir(Path::new("/p/dist")));
        assert!(fs.exists(Path::new("/p/dist/index.js")));
        assert_eq!(fs.read_to_string(Path::new("/p/dist/index.js")).unwrap(), "x");
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/dist/a.js", "a");
        fs.remove("/p/dist");
        assert!(!fs.exists(Path::new("/p/dist")));
        assert!(!fs.exists(Path::new("/p/dist/a.js")));
        assert!(fs.exists(Path::new("/p")));
    }

    #[test]
    fn modified_reports_the_given_time() {
        let fs = MockFileSystem::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        fs.add_file_at("/p/out.bin", "", t);
        assert_eq!(fs.modified(Path::new("/p/out.bin")).unwrap(), t);
    }
}
