//! Nodes and the arena that owns them.
//!
//! # Ownership
//!
//! The tree is an arena keyed by [`NodeId`]. A directory "owns" its children
//! only in the sense that their IDs appear in its child table; a child points
//! back at its parent by ID, never by reference. Removing a node from the
//! arena therefore can't leave a dangling pointer, only a stale ID, and the
//! facade keeps the child tables and parent IDs in step.
//!
//! File content lives in a separate table of shared buffers so hard links can
//! point several nodes at one buffer. Each buffer carries a reference count
//! and is freed when its last name goes away.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use tracing::debug;

use super::buffer::Buffer;
use super::types::{BufferId, FileType, NodeId, NodeInfo};

/// Reserved prefix of a symlink's content.
pub const SYMLINK_MARKER: &[u8; 4] = b"sym:";

/// What a node holds.
#[derive(Debug, Clone)]
pub enum NodeBody {
    /// Regular file.
    File {
        buffer: BufferId,
        /// Absolute paths of hard links made to this node.
        links: Vec<String>,
        /// Canonical path this node is a hard link to.
        linked_from: Option<String>,
    },
    /// Directory with its child table (name → ID).
    Directory { children: BTreeMap<String, NodeId> },
    /// Symbolic link. Content is `sym:` followed by the target.
    Symlink { buffer: BufferId, target: String },
}

/// A file, directory, or symlink.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) modtime: SystemTime,
    pub(crate) body: NodeBody,
}

impl Node {
    fn new(id: NodeId, name: impl Into<String>, parent: Option<NodeId>, body: NodeBody) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            modtime: SystemTime::now(),
            body,
        }
    }

    /// Create a directory node.
    pub fn directory(id: NodeId, name: impl Into<String>, parent: Option<NodeId>) -> Self {
        let children = BTreeMap::new();
        Self::new(id, name, parent, NodeBody::Directory { children })
    }

    /// Create a regular file node over `buffer`.
    pub fn file(id: NodeId, name: impl Into<String>, parent: NodeId, buffer: BufferId) -> Self {
        let body = NodeBody::File {
            buffer,
            links: Vec::new(),
            linked_from: None,
        };
        Self::new(id, name, Some(parent), body)
    }

    /// Create a symlink node whose content lives in `buffer`.
    pub fn symlink(
        id: NodeId,
        name: impl Into<String>,
        parent: NodeId,
        buffer: BufferId,
        target: impl Into<String>,
    ) -> Self {
        let body = NodeBody::Symlink {
            buffer,
            target: target.into(),
        };
        Self::new(id, name, Some(parent), body)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn modtime(&self) -> SystemTime {
        self.modtime
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    pub fn kind(&self) -> FileType {
        match self.body {
            NodeBody::File { .. } => FileType::File,
            NodeBody::Directory { .. } => FileType::Directory,
            NodeBody::Symlink { .. } => FileType::Symlink,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.body, NodeBody::Directory { .. })
    }

    /// Content buffer, for files and symlinks.
    pub fn buffer(&self) -> Option<BufferId> {
        match self.body {
            NodeBody::File { buffer, .. } | NodeBody::Symlink { buffer, .. } => Some(buffer),
            NodeBody::Directory { .. } => None,
        }
    }

    /// Child table, for directories.
    pub fn children(&self) -> Option<&BTreeMap<String, NodeId>> {
        match &self.body {
            NodeBody::Directory { children } => Some(children),
            _ => None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.modtime = SystemTime::now();
    }
}

#[derive(Debug, Clone)]
struct SharedBuffer {
    buffer: Buffer,
    refs: usize,
}

/// Arena of nodes plus the shared buffer table.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    buffers: HashMap<BufferId, SharedBuffer>,
    next_buffer: u64,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, Node::directory(NodeId::ROOT, "/", None));
        Self {
            nodes,
            buffers: HashMap::new(),
            next_buffer: 0,
        }
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root can't be removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> &Node {
        &self.nodes[&NodeId::ROOT]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Look up `name` in directory `parent`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.get(parent)?.children()?.get(name).copied()
    }

    /// Materialize the absolute path of `id` by walking parent IDs.
    pub fn abs_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            match node.parent {
                Some(parent) => {
                    names.push(node.name.as_str());
                    current = self.get(parent);
                }
                None => break,
            }
        }

        if names.is_empty() {
            return "/".to_string();
        }
        names.reverse();
        let mut path = String::new();
        for name in names {
            path.push('/');
            path.push_str(name);
        }
        path
    }

    /// Insert `node` and register it in its parent's child table.
    ///
    /// The caller has already checked the parent is a directory and the
    /// name is free.
    pub(crate) fn attach(&mut self, node: Node) {
        if let Some(children) = node.parent.and_then(|p| self.children_mut(p)) {
            children.insert(node.name.clone(), node.id);
        }
        self.nodes.insert(node.id, node);
    }

    /// Remove `id` from the arena and its parent's child table.
    ///
    /// Releases the node's buffer reference. Directories are expected to be
    /// empty; the caller checks.
    pub(crate) fn detach(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        if let Some(children) = node.parent.and_then(|p| self.children_mut(p)) {
            children.remove(&node.name);
        }
        if let Some(buffer) = node.buffer() {
            self.release_buffer(buffer);
        }
        Some(node)
    }

    fn children_mut(&mut self, id: NodeId) -> Option<&mut BTreeMap<String, NodeId>> {
        match &mut self.nodes.get_mut(&id)?.body {
            NodeBody::Directory { children } => Some(children),
            _ => None,
        }
    }

    /// Metadata for `id`.
    pub fn info(&self, id: NodeId) -> Option<NodeInfo> {
        let node = self.get(id)?;
        let (size, len, blocks) = match node.buffer().and_then(|b| self.buffer(b)) {
            Some(buffer) => (
                buffer.capacity() as u64,
                buffer.len() as u64,
                buffer.block_count(),
            ),
            None => (0, 0, 0),
        };
        let links = match &node.body {
            NodeBody::File { links, .. } => links.len(),
            _ => 0,
        };
        Some(NodeInfo {
            name: node.name.clone(),
            id: node.id,
            size,
            len,
            blocks,
            links,
            kind: node.kind(),
            modtime: node.modtime,
        })
    }

    /// All node IDs, sorted.
    pub fn ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Shared buffers
    // ========================================================================

    /// Store a new buffer with one reference.
    pub(crate) fn alloc_buffer(&mut self, buffer: Buffer) -> BufferId {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(id, SharedBuffer { buffer, refs: 1 });
        id
    }

    /// Add a reference to an existing buffer.
    pub(crate) fn share_buffer(&mut self, id: BufferId) -> bool {
        match self.buffers.get_mut(&id) {
            Some(shared) => {
                shared.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference, freeing the buffer at zero.
    pub(crate) fn release_buffer(&mut self, id: BufferId) {
        if let Some(shared) = self.buffers.get_mut(&id) {
            shared.refs = shared.refs.saturating_sub(1);
            if shared.refs == 0 {
                self.buffers.remove(&id);
                debug!(buffer = id.0, "freed content buffer");
            }
        }
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id).map(|s| &s.buffer)
    }

    pub(crate) fn buffer_mut(&mut self, id: BufferId) -> Option<&mut Buffer> {
        self.buffers.get_mut(&id).map(|s| &mut s.buffer)
    }

    /// Number of names referencing a buffer.
    pub fn buffer_refs(&self, id: BufferId) -> usize {
        self.buffers.get(&id).map(|s| s.refs).unwrap_or(0)
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_file() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new();
        let dir = NodeId(1);
        tree.attach(Node::directory(dir, "d", Some(NodeId::ROOT)));
        let buffer = tree.alloc_buffer(Buffer::from_bytes(4, b"hello"));
        let file = NodeId(2);
        tree.attach(Node::file(file, "f", dir, buffer));
        (tree, dir, file)
    }

    #[test]
    fn test_root_only() {
        let tree = Tree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.root().is_dir());
        assert_eq!(tree.abs_path(NodeId::ROOT), "/");
    }

    #[test]
    fn test_attach_registers_child() {
        let (tree, dir, file) = tree_with_file();
        assert_eq!(tree.child(NodeId::ROOT, "d"), Some(dir));
        assert_eq!(tree.child(dir, "f"), Some(file));
        assert_eq!(tree.get(file).unwrap().parent(), Some(dir));
        assert_eq!(tree.abs_path(file), "/d/f");
    }

    #[test]
    fn test_detach_releases_buffer() {
        let (mut tree, dir, file) = tree_with_file();
        let buffer = tree.get(file).unwrap().buffer().unwrap();
        assert!(tree.share_buffer(buffer));
        assert_eq!(tree.buffer_refs(buffer), 2);

        tree.detach(file).unwrap();
        assert_eq!(tree.child(dir, "f"), None);
        assert_eq!(tree.buffer_refs(buffer), 1);

        tree.release_buffer(buffer);
        assert_eq!(tree.buffer_count(), 0);
    }

    #[test]
    fn test_info_reports_block_granular_size() {
        let (tree, dir, file) = tree_with_file();
        let info = tree.info(file).unwrap();
        assert_eq!(info.size, 8);
        assert_eq!(info.len, 5);
        assert_eq!(info.blocks, 2);
        assert_eq!(info.kind, FileType::File);

        let info = tree.info(dir).unwrap();
        assert_eq!(info.size, 0);
        assert!(info.is_dir());
    }
}
