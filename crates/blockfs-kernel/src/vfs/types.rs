//! Core filesystem types.
//!
//! Identifiers are plain integers wrapped in newtypes so node IDs,
//! descriptors, and shared-buffer keys can't be mixed up. All of them
//! serialize transparently for the snapshot format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Unique node identifier. The root is always `NodeId::ROOT` (0).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The root directory.
    pub const ROOT: NodeId = NodeId(0);

    /// Check if this is the root directory.
    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Open-file handle. Opaque to callers beyond its display value.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fd(pub u32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key into the shared content-buffer table. Hard links share one.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferId(pub u64);

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Node metadata as reported by `stat` and `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Leaf name (`/` for the root).
    pub name: String,
    /// Node ID.
    pub id: NodeId,
    /// Size in bytes at block granularity (`blocks * block_size`). Zero for directories.
    pub size: u64,
    /// Precise content length in bytes.
    pub len: u64,
    /// Number of allocated blocks.
    pub blocks: usize,
    /// Number of hard-link names recorded against this node.
    pub links: usize,
    /// File type.
    pub kind: FileType,
    /// Last modification time.
    pub modtime: SystemTime,
}

impl NodeInfo {
    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Engine configuration.
///
/// Every field has a default, so a partial config file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Capacity of every block in bytes.
    pub block_size: usize,
    /// Upper bound on simultaneously open descriptors.
    pub max_descriptors: usize,
    /// Reject a second `open` of a node that already has a descriptor.
    pub exclusive_open: bool,
    /// Create missing intermediate directories on `create`/`mkdir`.
    pub create_parents: bool,
    /// Longest symlink chain followed before giving up.
    pub max_symlink_depth: usize,
}

/// Default block capacity.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Default descriptor pool size.
pub const DEFAULT_MAX_DESCRIPTORS: usize = 1024;

/// Default symlink chain limit.
pub const DEFAULT_MAX_SYMLINK_DEPTH: usize = 8;

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_descriptors: DEFAULT_MAX_DESCRIPTORS,
            exclusive_open: false,
            create_parents: true,
            max_symlink_depth: DEFAULT_MAX_SYMLINK_DEPTH,
        }
    }
}

impl FsConfig {
    /// Set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Set the descriptor bound.
    pub fn with_max_descriptors(mut self, max: usize) -> Self {
        self.max_descriptors = max;
        self
    }

    /// Enforce single-open-per-file.
    pub fn with_exclusive_open(mut self, exclusive: bool) -> Self {
        self.exclusive_open = exclusive;
        self
    }

    /// Toggle mkdir -p semantics.
    pub fn with_create_parents(mut self, create: bool) -> Self {
        self.create_parents = create;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Symlink.is_symlink());
    }

    #[test]
    fn test_config_builder() {
        let config = FsConfig::default()
            .with_block_size(0)
            .with_max_descriptors(4)
            .with_exclusive_open(true);
        assert_eq!(config.block_size, 1);
        assert_eq!(config.max_descriptors, 4);
        assert!(config.exclusive_open);
        assert!(config.create_parents);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: FsConfig = serde_json::from_str(r#"{"block_size": 16}"#).unwrap();
        assert_eq!(config.block_size, 16);
        assert_eq!(config.max_descriptors, DEFAULT_MAX_DESCRIPTORS);
        assert_eq!(config.max_symlink_depth, DEFAULT_MAX_SYMLINK_DEPTH);
    }

    #[test]
    fn test_ids_display_as_numbers() {
        assert_eq!(NodeId(42).to_string(), "42");
        assert_eq!(Fd(3).to_string(), "3");
        assert!(NodeId::ROOT.is_root());
    }
}
