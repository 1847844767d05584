//! The filesystem facade.
//!
//! [`Filesystem`] owns the node arena, the working directory, the ID table,
//! and the descriptor table. Every public operation validates fully before
//! mutating, so a failed call leaves the tree exactly as it was.

use std::collections::BTreeMap;

use tracing::debug;

use super::buffer::Buffer;
use super::descriptor::DescriptorTable;
use super::error::{ErrorKind, VfsError, VfsResult};
use super::node::{Node, NodeBody, SYMLINK_MARKER, Tree};
use super::path::{self, Resolved};
use super::types::{BufferId, Fd, FileType, FsConfig, NodeId, NodeInfo};

/// What a create-style operation puts at the new path.
pub(crate) enum NewNode {
    Directory,
    File,
    /// Hard link sharing `buffer`, pointing back at `canonical`.
    Link { buffer: BufferId, canonical: String },
    Symlink { target: String },
}

/// An in-memory filesystem.
#[derive(Debug, Clone)]
pub struct Filesystem {
    pub(crate) config: FsConfig,
    pub(crate) tree: Tree,
    pub(crate) cwd: NodeId,
    /// ID → absolute path, for lookup by ID.
    pub(crate) ids: BTreeMap<NodeId, String>,
    pub(crate) descriptors: DescriptorTable,
    pub(crate) next_id: u64,
}

impl Default for Filesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem {
    /// Create an empty filesystem with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FsConfig::default())
    }

    /// Create an empty filesystem (root only).
    pub fn with_config(mut config: FsConfig) -> Self {
        config.block_size = config.block_size.max(1);
        let mut ids = BTreeMap::new();
        ids.insert(NodeId::ROOT, "/".to_string());
        Self {
            descriptors: DescriptorTable::new(config.max_descriptors),
            config,
            tree: Tree::new(),
            cwd: NodeId::ROOT,
            ids,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// The node arena, for read-only inspection.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// The ID table (ID → absolute path).
    pub fn id_table(&self) -> &BTreeMap<NodeId, String> {
        &self.ids
    }

    /// The descriptor table.
    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create an empty regular file.
    pub fn create(&mut self, path: &str) -> VfsResult<NodeId> {
        self.create_node("create", path, NewNode::File)
    }

    /// Create a directory.
    pub fn mkdir(&mut self, path: &str) -> VfsResult<NodeId> {
        self.create_node("mkdir", path, NewNode::Directory)
    }

    pub(crate) fn create_node(
        &mut self,
        op: &'static str,
        path: &str,
        new: NewNode,
    ) -> VfsResult<NodeId> {
        let resolved = match self.tree.resolve(self.cwd, path) {
            Ok(resolved) => resolved,
            Err(ErrorKind::NotExist) if self.config.create_parents => {
                let normalized = path::normalize(&self.pwd(), path);
                self.mkdir_all(op, path::parent_of(&normalized))?;
                self.resolve(op, path)?
            }
            Err(kind) => return Err(VfsError::path(op, path, kind)),
        };

        if resolved.node.is_some() {
            return Err(VfsError::path(op, path, ErrorKind::AlreadyExists));
        }
        let parent = resolved
            .parent
            .ok_or_else(|| VfsError::path(op, path, ErrorKind::InvalidPath))?;

        let id = self.alloc_id();
        let name = resolved.name().to_string();
        let block_size = self.block_size();
        let node = match new {
            NewNode::Directory => Node::directory(id, name, Some(parent)),
            NewNode::File => {
                let buffer = self.tree.alloc_buffer(Buffer::new(block_size));
                Node::file(id, name, parent, buffer)
            }
            NewNode::Link { buffer, canonical } => {
                self.tree.share_buffer(buffer);
                let mut node = Node::file(id, name, parent, buffer);
                if let NodeBody::File { linked_from, .. } = &mut node.body {
                    *linked_from = Some(canonical);
                }
                node
            }
            NewNode::Symlink { target } => {
                let mut content = SYMLINK_MARKER.to_vec();
                content.extend_from_slice(target.as_bytes());
                let buffer = self
                    .tree
                    .alloc_buffer(Buffer::from_bytes(block_size, &content));
                Node::symlink(id, name, parent, buffer, target)
            }
        };

        debug!(op, %id, path = %resolved.path, "node created");
        self.tree.attach(node);
        self.touch(parent);
        self.ids.insert(id, resolved.path);
        Ok(id)
    }

    /// Create every missing directory along `dir` (an absolute path).
    fn mkdir_all(&mut self, op: &'static str, dir: &str) -> VfsResult<()> {
        let mut current = NodeId::ROOT;
        for seg in path::segments(dir) {
            current = match self.tree.child(current, seg) {
                Some(id) if self.tree.get(id).is_some_and(Node::is_dir) => id,
                Some(_) => return Err(VfsError::path(op, dir, ErrorKind::NotADirectory)),
                None => {
                    let id = self.alloc_id();
                    self.tree.attach(Node::directory(id, seg, Some(current)));
                    self.touch(current);
                    self.ids.insert(id, self.tree.abs_path(id));
                    debug!(%id, dir = seg, "created intermediate directory");
                    id
                }
            };
        }
        Ok(())
    }

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ========================================================================
    // Descriptors
    // ========================================================================

    /// Open a file, following symlinks.
    pub fn open(&mut self, path: &str) -> VfsResult<Fd> {
        let id = self.follow("open", path)?;
        if self.is_dir(id) {
            return Err(VfsError::path("open", path, ErrorKind::IsADirectory));
        }
        self.descriptors
            .open(id, self.config.exclusive_open)
            .map_err(|kind| VfsError::path("open", path, kind))
    }

    /// Release a handle. Returns false if it wasn't open.
    pub fn close(&mut self, fd: Fd) -> bool {
        self.descriptors.close(fd).is_some()
    }

    /// Read up to `size` bytes at `offset`. Short at end of content.
    pub fn read_at(&self, fd: Fd, offset: usize, size: usize) -> VfsResult<Vec<u8>> {
        let buffer = self.fd_buffer("read", fd)?;
        let buffer = self
            .tree
            .buffer(buffer)
            .ok_or_else(|| VfsError::descriptor("read", fd, ErrorKind::NotOpen))?;

        let mut out = vec![0; size.min(buffer.len().saturating_sub(offset))];
        let n = buffer
            .read_at(&mut out, offset)
            .map_err(|kind| VfsError::descriptor("read", fd, kind))?;
        out.truncate(n);
        Ok(out)
    }

    /// Write `bytes` at `offset`. Returns the number of bytes written.
    pub fn write_at(&mut self, fd: Fd, offset: usize, bytes: &[u8]) -> VfsResult<usize> {
        let id = self.fd_node("write", fd)?;
        let buffer = self.fd_buffer("write", fd)?;
        let n = self
            .tree
            .buffer_mut(buffer)
            .ok_or_else(|| VfsError::descriptor("write", fd, ErrorKind::NotOpen))?
            .write_at(bytes, offset)
            .map_err(|kind| VfsError::descriptor("write", fd, kind))?;
        self.touch(id);
        Ok(n)
    }

    /// Append `bytes` at the end of content.
    pub fn append(&mut self, fd: Fd, bytes: &[u8]) -> VfsResult<usize> {
        let id = self.fd_node("append", fd)?;
        let buffer = self.fd_buffer("append", fd)?;
        let n = self
            .tree
            .buffer_mut(buffer)
            .ok_or_else(|| VfsError::descriptor("append", fd, ErrorKind::NotOpen))?
            .write(bytes);
        self.touch(id);
        Ok(n)
    }

    fn fd_node(&self, op: &'static str, fd: Fd) -> VfsResult<NodeId> {
        self.descriptors
            .get(fd)
            .map_err(|kind| VfsError::descriptor(op, fd, kind))
    }

    fn fd_buffer(&self, op: &'static str, fd: Fd) -> VfsResult<BufferId> {
        let id = self.fd_node(op, fd)?;
        self.tree
            .get(id)
            .and_then(Node::buffer)
            .ok_or_else(|| VfsError::descriptor(op, fd, ErrorKind::NotOpen))
    }

    // ========================================================================
    // Path operations
    // ========================================================================

    /// Set a file's length to exactly `size`, following symlinks.
    pub fn truncate(&mut self, path: &str, size: usize) -> VfsResult<()> {
        let id = self.follow("truncate", path)?;
        let buffer = self
            .tree
            .get(id)
            .and_then(Node::buffer)
            .ok_or_else(|| VfsError::path("truncate", path, ErrorKind::IsADirectory))?;
        if let Some(buffer) = self.tree.buffer_mut(buffer) {
            buffer
                .truncate(size)
                .map_err(|kind| VfsError::path("truncate", path, kind))?;
        }
        self.touch(id);
        Ok(())
    }

    /// Remove a file or symlink. Open handles on it are closed.
    pub fn remove(&mut self, path: &str) -> VfsResult<()> {
        self.remove_entry("remove", path)
    }

    pub(crate) fn remove_entry(&mut self, op: &'static str, path: &str) -> VfsResult<()> {
        let resolved = self.resolve(op, path)?;
        let id = resolved
            .node
            .ok_or_else(|| VfsError::path(op, path, ErrorKind::NotExist))?;
        if self.is_dir(id) {
            return Err(VfsError::path(op, path, ErrorKind::IsADirectory));
        }

        self.forget_link(id, &resolved.path);
        let closed = self.descriptors.close_node(id);
        if closed > 0 {
            debug!(%id, closed, "closed descriptors of removed node");
        }
        self.detach(id);
        Ok(())
    }

    /// Remove an empty directory.
    pub fn remove_dir(&mut self, path: &str) -> VfsResult<()> {
        let op = "rmdir";
        let resolved = self.resolve(op, path)?;
        let id = resolved
            .node
            .ok_or_else(|| VfsError::path(op, path, ErrorKind::NotExist))?;
        if id.is_root() {
            return Err(VfsError::path(op, path, ErrorKind::InvalidPath));
        }
        let children = self
            .tree
            .get(id)
            .and_then(Node::children)
            .ok_or_else(|| VfsError::path(op, path, ErrorKind::NotADirectory))?;
        if !children.is_empty() {
            return Err(VfsError::path(op, path, ErrorKind::DirectoryNotEmpty));
        }

        if self.cwd == id {
            self.cwd = resolved.parent.unwrap_or(NodeId::ROOT);
        }
        self.detach(id);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(node) = self.tree.detach(id) {
            if let Some(parent) = node.parent {
                self.touch(parent);
            }
            self.ids.remove(&id);
            debug!(%id, name = %node.name, "node removed");
        }
    }

    /// Change the working directory, following symlinks.
    pub fn cd(&mut self, path: &str) -> VfsResult<()> {
        let id = self.follow("cd", path)?;
        if !self.is_dir(id) {
            return Err(VfsError::path("cd", path, ErrorKind::NotADirectory));
        }
        self.cwd = id;
        Ok(())
    }

    /// Absolute path of the working directory.
    pub fn pwd(&self) -> String {
        self.tree.abs_path(self.cwd)
    }

    /// Entries of the working directory, sorted by name.
    pub fn list(&self) -> Vec<NodeInfo> {
        self.entries(self.cwd)
    }

    /// Entries of `path`, sorted by name.
    pub fn list_dir(&self, path: &str) -> VfsResult<Vec<NodeInfo>> {
        let id = self.follow("ls", path)?;
        if !self.is_dir(id) {
            return Err(VfsError::path("ls", path, ErrorKind::NotADirectory));
        }
        Ok(self.entries(id))
    }

    fn entries(&self, dir: NodeId) -> Vec<NodeInfo> {
        self.tree
            .get(dir)
            .and_then(Node::children)
            .map(|children| {
                children
                    .values()
                    .filter_map(|&id| self.tree.info(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Metadata by node ID.
    pub fn stat(&self, id: NodeId) -> VfsResult<NodeInfo> {
        let not_found = || VfsError::path("stat", format!("#{id}"), ErrorKind::NotExist);
        let path = self.ids.get(&id).ok_or_else(not_found)?;
        let resolved = self.tree.resolve(NodeId::ROOT, path).map_err(|_| not_found())?;
        match resolved.node {
            Some(found) if found == id => self.tree.info(id).ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }

    /// Metadata by path. Symlinks are reported, not followed.
    pub fn stat_path(&self, path: &str) -> VfsResult<NodeInfo> {
        let resolved = self.resolve("stat", path)?;
        resolved
            .node
            .and_then(|id| self.tree.info(id))
            .ok_or_else(|| VfsError::path("stat", path, ErrorKind::NotExist))
    }

    /// Whole content of a file, following symlinks.
    pub fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let id = self.follow("cat", path)?;
        self.tree
            .get(id)
            .and_then(Node::buffer)
            .and_then(|b| self.tree.buffer(b))
            .map(Buffer::read_all)
            .ok_or_else(|| VfsError::path("cat", path, ErrorKind::IsADirectory))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Resolve without following a final symlink.
    pub(crate) fn resolve(&self, op: &'static str, path: &str) -> VfsResult<Resolved> {
        self.tree
            .resolve(self.cwd, path)
            .map_err(|kind| VfsError::path(op, path, kind))
    }

    pub(crate) fn is_dir(&self, id: NodeId) -> bool {
        self.tree.get(id).is_some_and(Node::is_dir)
    }

    pub(crate) fn kind_of(&self, id: NodeId) -> Option<FileType> {
        self.tree.get(id).map(Node::kind)
    }

    pub(crate) fn touch(&mut self, id: NodeId) {
        if let Some(node) = self.tree.get_mut(id) {
            node.touch();
        }
    }
}
