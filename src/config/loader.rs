// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AutopilotError, Result};
use crate::fs::FileSystem;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the entry point used by `start` and `test`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// [`load_and_validate`] on the blocking pool, for periodic re-reads from
/// inside the runtime (action reloads, health checks).
pub async fn reload(path: PathBuf) -> Result<ConfigFile> {
    tokio::task::spawn_blocking(move || load_and_validate(path))
        .await
        .map_err(|e| AutopilotError::Other(anyhow::anyhow!("config reload task failed: {e}")))?
}

/// Write the default configuration to `path` unless a file already exists.
///
/// Returns `true` if a new file was written.
pub fn write_default_if_absent(fs: &dyn FileSystem, path: &Path) -> Result<bool> {
    if fs.exists(path) {
        return Ok(false);
    }

    let rendered = toml::to_string_pretty(&RawConfigFile::default())?;
    fs.write(path, rendered.as_bytes())?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn default_config_round_trips_through_validation() {
        let fs = MockFileSystem::new();
        let path = Path::new("/p/.autopilot/config.toml");

        assert!(write_default_if_absent(&fs, path).unwrap());
        let text = fs.read_to_string(path).unwrap();
        let raw: RawConfigFile = toml::from_str(&text).unwrap();
        let cfg = ConfigFile::try_from(raw).unwrap();

        assert!(cfg.actions().contains_key("lint"));
        assert_eq!(cfg.triggers().file_change.debounce_ms, 1_000);
    }

    #[test]
    fn existing_config_is_left_untouched() {
        let fs = MockFileSystem::new();
        let path = Path::new("/p/.autopilot/config.toml");
        fs.add_file(path, "# hand edited\n");

        assert!(!write_default_if_absent(&fs, path).unwrap());
        assert_eq!(fs.read_to_string(path).unwrap(), "# hand edited\n");
    }
}
