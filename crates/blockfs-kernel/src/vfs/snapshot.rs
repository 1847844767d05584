//! Whole-tree snapshots.
//!
//! A snapshot is a JSON document: a header carrying the block size, the ID
//! generator state and the ID table, plus the tree itself as nested node
//! records. File content is stored as decoded bytes (base64) and re-blocked
//! on load, so the block layout on disk never leaks into the format.
//!
//! Hard links are recorded by giving every file record the key of its
//! content buffer. On load, records carrying the same key are re-attached to
//! a single shared buffer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::buffer::Buffer;
use super::error::{VfsError, VfsResult};
use super::fs::Filesystem;
use super::node::{Node, NodeBody, SYMLINK_MARKER};
use super::types::{BufferId, FileType, FsConfig, NodeId};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializes concurrent `save` calls against the snapshot file.
static SAVE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    version: u32,
    block_size: usize,
    max_descriptors: usize,
    next_id: u64,
    /// ID → absolute path at save time.
    table: BTreeMap<NodeId, String>,
    root: NodeRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    id: NodeId,
    name: String,
    kind: FileType,
    modtime: SystemTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    linked_from: Option<String>,
    /// Shared-content key. Equal keys mean one buffer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    buffer: Option<BufferId>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "content")]
    data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeRecord>,
}

/// Base64 for file bytes.
mod content {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialize the whole filesystem to a JSON document.
pub fn encode(fs: &Filesystem) -> VfsResult<String> {
    let record = SnapshotRecord {
        version: SNAPSHOT_VERSION,
        block_size: fs.config.block_size,
        max_descriptors: fs.config.max_descriptors,
        next_id: fs.next_id,
        table: fs.ids.clone(),
        root: encode_node(fs, NodeId::ROOT)?,
    };
    Ok(serde_json::to_string_pretty(&record)?)
}

fn encode_node(fs: &Filesystem, id: NodeId) -> VfsResult<NodeRecord> {
    let node = fs
        .tree
        .get(id)
        .ok_or_else(|| VfsError::corrupt(format!("dangling node id {id}")))?;

    let mut record = NodeRecord {
        id,
        name: node.name.clone(),
        kind: node.kind(),
        modtime: node.modtime,
        links: Vec::new(),
        linked_from: None,
        buffer: node.buffer(),
        data: node
            .buffer()
            .and_then(|b| fs.tree.buffer(b))
            .map(Buffer::read_all),
        children: Vec::new(),
    };

    match &node.body {
        NodeBody::File {
            links, linked_from, ..
        } => {
            record.links = links.clone();
            record.linked_from = linked_from.clone();
        }
        NodeBody::Directory { children } => {
            record.children = children
                .values()
                .map(|&child| encode_node(fs, child))
                .collect::<VfsResult<_>>()?;
        }
        NodeBody::Symlink { .. } => {}
    }
    Ok(record)
}

// ============================================================================
// Decoding
// ============================================================================

/// Rebuild a filesystem from a JSON document.
///
/// The stored block size overrides `config.block_size`. Descriptors are not
/// persisted and the working directory starts at `/`.
pub fn decode(json: &str, mut config: FsConfig) -> VfsResult<Filesystem> {
    let record: SnapshotRecord = serde_json::from_str(json)?;
    if record.version != SNAPSHOT_VERSION {
        return Err(VfsError::corrupt(format!(
            "unsupported snapshot version {}",
            record.version
        )));
    }
    if record.block_size != config.block_size {
        debug!(
            stored = record.block_size,
            configured = config.block_size,
            "using block size from snapshot"
        );
    }
    config.block_size = record.block_size;
    if record.max_descriptors != config.max_descriptors {
        debug!(
            stored = record.max_descriptors,
            configured = config.max_descriptors,
            "descriptor bound differs from snapshot; keeping configured value"
        );
    }

    let root = &record.root;
    if root.id != NodeId::ROOT || root.kind != FileType::Directory {
        return Err(VfsError::corrupt("root must be directory 0"));
    }

    let mut fs = Filesystem::with_config(config);
    if let Some(node) = fs.tree.get_mut(NodeId::ROOT) {
        node.modtime = root.modtime;
    }

    let mut loader = Loader {
        fs: &mut fs,
        seen: HashSet::from([NodeId::ROOT]),
        shared: HashMap::new(),
    };
    for child in &root.children {
        loader.attach(NodeId::ROOT, child)?;
    }

    let max_id = fs.tree.ids().last().map(|id| id.0).unwrap_or(0);
    fs.next_id = record.next_id.max(max_id + 1);

    fs.ids = fs
        .tree
        .ids()
        .into_iter()
        .map(|id| (id, fs.tree.abs_path(id)))
        .collect();
    if fs.ids != record.table {
        warn!(
            stored = record.table.len(),
            rebuilt = fs.ids.len(),
            "snapshot id table disagrees with tree; using rebuilt table"
        );
    }

    Ok(fs)
}

struct Loader<'a> {
    fs: &'a mut Filesystem,
    seen: HashSet<NodeId>,
    /// Stored buffer key → live buffer.
    shared: HashMap<BufferId, BufferId>,
}

impl Loader<'_> {
    fn attach(&mut self, parent: NodeId, record: &NodeRecord) -> VfsResult<()> {
        if !self.seen.insert(record.id) {
            return Err(VfsError::corrupt(format!("duplicate node id {}", record.id)));
        }
        let name = record.name.as_str();
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(VfsError::corrupt(format!("invalid name {name:?}")));
        }
        if self.fs.tree.child(parent, name).is_some() {
            return Err(VfsError::corrupt(format!("duplicate entry {name:?}")));
        }
        if record.kind != FileType::Directory && !record.children.is_empty() {
            return Err(VfsError::corrupt(format!("{name:?} has children but is not a directory")));
        }

        let block_size = self.fs.config.block_size;
        let data = record.data.as_deref().unwrap_or_default();
        let mut node = match record.kind {
            FileType::Directory => Node::directory(record.id, name, Some(parent)),
            FileType::File => {
                let buffer = self.content(record.buffer, Buffer::from_bytes(block_size, data));
                let mut node = Node::file(record.id, name, parent, buffer);
                if let NodeBody::File {
                    links, linked_from, ..
                } = &mut node.body
                {
                    links.clone_from(&record.links);
                    linked_from.clone_from(&record.linked_from);
                }
                node
            }
            FileType::Symlink => {
                let target = data
                    .strip_prefix(SYMLINK_MARKER.as_slice())
                    .and_then(|t| std::str::from_utf8(t).ok())
                    .ok_or_else(|| VfsError::corrupt(format!("symlink {name:?} lacks target")))?
                    .to_string();
                let buffer = self
                    .fs
                    .tree
                    .alloc_buffer(Buffer::from_bytes(block_size, data));
                Node::symlink(record.id, name, parent, buffer, target)
            }
        };
        node.modtime = record.modtime;
        self.fs.tree.attach(node);

        for child in &record.children {
            self.attach(record.id, child)?;
        }
        Ok(())
    }

    /// Live buffer for a stored key: the first record with a key supplies
    /// the content, later records with the same key share it.
    fn content(&mut self, key: Option<BufferId>, fresh: Buffer) -> BufferId {
        let tree = &mut self.fs.tree;
        match key.and_then(|k| self.shared.get(&k).copied()) {
            Some(live) => {
                tree.share_buffer(live);
                live
            }
            None => {
                let live = tree.alloc_buffer(fresh);
                if let Some(key) = key {
                    self.shared.insert(key, live);
                }
                live
            }
        }
    }
}

// ============================================================================
// Files
// ============================================================================

/// Write a snapshot of `fs` to `path`.
///
/// The document goes to a uniquely named temp file in the same directory
/// and is persisted over `path`, so a failed save leaves the previous
/// snapshot intact.
pub fn save(path: &Path, fs: &Filesystem) -> VfsResult<()> {
    let _guard = SAVE_LOCK.lock();
    let json = encode(fs)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path).map_err(|e| VfsError::Io(e.error))?;
    info!(path = %path.display(), nodes = fs.tree.len(), "snapshot saved");
    Ok(())
}

/// Read a snapshot from `path`.
pub fn load(path: &Path, config: FsConfig) -> VfsResult<Filesystem> {
    let json = std::fs::read_to_string(path)?;
    let fs = decode(&json, config)?;
    info!(path = %path.display(), nodes = fs.tree.len(), "snapshot loaded");
    Ok(fs)
}

/// A snapshot file that filesystems are mounted from and unmounted to.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or create and save an empty filesystem if the
    /// file doesn't exist yet.
    pub fn mount(&self, config: FsConfig) -> VfsResult<Filesystem> {
        match load(&self.path, config.clone()) {
            Ok(fs) => Ok(fs),
            Err(VfsError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot, creating empty filesystem");
                let fs = Filesystem::with_config(config);
                save(&self.path, &fs)?;
                Ok(fs)
            }
            Err(e) => Err(e),
        }
    }

    /// Save `fs` back to the snapshot file.
    pub fn unmount(&self, fs: &Filesystem) -> VfsResult<()> {
        save(&self.path, fs)
    }
}
