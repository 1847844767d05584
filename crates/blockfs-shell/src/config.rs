//! Shell configuration.
//!
//! Read from `~/.config/blockfs/config.toml` (or `--config`). Every key is
//! optional:
//!
//! ```toml
//! snapshot = "~/.local/share/blockfs/fs.json"
//!
//! [fs]
//! block_size = 512
//! max_descriptors = 1024
//! exclusive_open = false
//! create_parents = true
//! max_symlink_depth = 8
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blockfs_kernel::FsConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Snapshot file mounted at startup. `~` is expanded.
    pub snapshot: Option<String>,
    /// Engine settings.
    pub fs: FsConfig,
}

impl ShellConfig {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config")
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).with_context(|| format!("in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// The snapshot path to use, falling back to the XDG data dir.
    pub fn snapshot_path(&self) -> PathBuf {
        match &self.snapshot {
            Some(path) => expand(path),
            None => default_snapshot_path(),
        }
    }
}

/// Expand `~` in a user-supplied path.
pub fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).as_ref().into()
}

/// `~/.config/blockfs/config.toml`, if there is a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("blockfs").join("config.toml"))
}

/// `~/.local/share/blockfs/fs.json`, or `blockfs.json` in the current
/// directory when there is no data dir.
pub fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("blockfs").join("fs.json"))
        .unwrap_or_else(|| PathBuf::from("blockfs.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config() {
        let config = ShellConfig::parse("[fs]\nblock_size = 64\n").unwrap();
        assert_eq!(config.fs.block_size, 64);
        assert_eq!(config.fs.max_descriptors, FsConfig::default().max_descriptors);
        assert!(config.snapshot.is_none());
    }

    #[test]
    fn test_empty_config() {
        let config = ShellConfig::parse("").unwrap();
        assert_eq!(config.fs, FsConfig::default());
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(ShellConfig::parse("[fs]\nblock_size = \"big\"\n").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.fs, FsConfig::default());
    }

    #[test]
    fn test_snapshot_path_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "snapshot = \"/tmp/x/fs.json\"\n").unwrap();
        let config = ShellConfig::load(&path).unwrap();
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/x/fs.json"));
    }
}
