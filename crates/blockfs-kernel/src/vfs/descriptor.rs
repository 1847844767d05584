//! Open-file descriptor table.
//!
//! Handles are small integers handed out lowest-free-first from a bounded
//! pool. A handle is bound to a node ID, not to a path, so it keeps pointing
//! at the same node after the working directory changes.

use std::collections::BTreeMap;

use tracing::debug;

use super::error::{ErrorKind, KindResult};
use super::types::{Fd, NodeId};

/// Maps open handles to nodes.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    max: usize,
    open: BTreeMap<Fd, NodeId>,
}

impl DescriptorTable {
    /// Create an empty table that holds at most `max` handles.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            open: BTreeMap::new(),
        }
    }

    /// Bind a fresh handle to `node`.
    ///
    /// With `exclusive`, fails with `AlreadyOpen` if `node` already has a handle.
    pub fn open(&mut self, node: NodeId, exclusive: bool) -> KindResult<Fd> {
        if exclusive && self.open.values().any(|&n| n == node) {
            return Err(ErrorKind::AlreadyOpen);
        }

        // Keys are sorted: the first gap in 0, 1, 2, ... is the lowest free handle.
        let mut candidate: u32 = 0;
        for fd in self.open.keys() {
            if fd.0 != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate as usize >= self.max {
            return Err(ErrorKind::NoFreeDescriptors);
        }

        let fd = Fd(candidate);
        self.open.insert(fd, node);
        debug!(%fd, %node, "descriptor opened");
        Ok(fd)
    }

    /// Release `fd`. Returns the node it was bound to, if any.
    pub fn close(&mut self, fd: Fd) -> Option<NodeId> {
        let node = self.open.remove(&fd);
        match node {
            Some(node) => debug!(%fd, %node, "descriptor closed"),
            None => debug!(%fd, "close of unbound descriptor ignored"),
        }
        node
    }

    /// The node bound to `fd`.
    pub fn get(&self, fd: Fd) -> KindResult<NodeId> {
        self.open.get(&fd).copied().ok_or(ErrorKind::NotOpen)
    }

    /// Close every handle bound to `node`. Returns how many were closed.
    pub fn close_node(&mut self, node: NodeId) -> usize {
        let before = self.open.len();
        self.open.retain(|_, n| *n != node);
        before - self.open.len()
    }

    /// Whether `node` has at least one open handle.
    pub fn is_node_open(&self, node: NodeId) -> bool {
        self.open.values().any(|&n| n == node)
    }

    /// Open handles in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (Fd, NodeId)> + '_ {
        self.open.iter().map(|(&fd, &node)| (fd, node))
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Pool bound.
    pub fn capacity(&self) -> usize {
        self.max
    }
}
