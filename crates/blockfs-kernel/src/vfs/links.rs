//! Hard and symbolic links.
//!
//! A hard link is a second file node pointing at the same shared buffer as
//! its canonical node; the canonical node records every alias path in its
//! `links` list and each alias records the canonical path in `linked_from`.
//!
//! A symlink is a node of kind [`FileType::Symlink`]. Its content is the
//! marker `sym:` followed by the target, but resolution reads the target
//! from the node itself and never inspects content, so a regular file that
//! happens to start with `sym:` is just a file.

use tracing::debug;

use super::error::{ErrorKind, VfsError, VfsResult};
use super::fs::{Filesystem, NewNode};
use super::node::{Node, NodeBody};
use super::types::{FileType, NodeId};

impl Filesystem {
    /// Create `new_name` as a hard link to the file at `existing`.
    ///
    /// Both names share one content buffer: a write through either is seen
    /// through the other. Linking to an alias links to its canonical node.
    pub fn link(&mut self, existing: &str, new_name: &str) -> VfsResult<NodeId> {
        let source = self.follow("link", existing)?;
        let node = self
            .tree
            .get(source)
            .ok_or_else(|| VfsError::path("link", existing, ErrorKind::NotExist))?;
        let NodeBody::File {
            buffer,
            linked_from,
            ..
        } = &node.body
        else {
            return Err(VfsError::path("link", existing, ErrorKind::IsADirectory));
        };
        let buffer = *buffer;

        // An alias whose canonical node is gone (or no longer shares content)
        // becomes the canonical node for the new link.
        let canonical = linked_from
            .as_deref()
            .and_then(|path| self.tree.resolve(NodeId::ROOT, path).ok())
            .and_then(|resolved| resolved.node)
            .filter(|&id| self.tree.get(id).and_then(Node::buffer) == Some(buffer))
            .unwrap_or(source);
        let canonical_path = self.tree.abs_path(canonical);

        let id = self.create_node(
            "link",
            new_name,
            NewNode::Link {
                buffer,
                canonical: canonical_path.clone(),
            },
        )?;

        let alias = self.tree.abs_path(id);
        if let Some(NodeBody::File { links, .. }) =
            self.tree.get_mut(canonical).map(|n| &mut n.body)
        {
            links.push(alias.clone());
        }
        let refs = self.tree.buffer_refs(buffer);
        debug!(%canonical, alias = %alias, refs, "hard link created");
        Ok(id)
    }

    /// Create `new_name` as a symbolic link to `target`.
    ///
    /// The target is stored as given and need not exist.
    pub fn symlink(&mut self, target: &str, new_name: &str) -> VfsResult<NodeId> {
        if target.trim().is_empty() {
            return Err(VfsError::path("symlink", target, ErrorKind::InvalidPath));
        }
        self.create_node(
            "symlink",
            new_name,
            NewNode::Symlink {
                target: target.to_string(),
            },
        )
    }

    /// Remove a name. For a hard link the shared content survives for the
    /// remaining names; for a symlink only the link itself goes away.
    pub fn unlink(&mut self, name: &str) -> VfsResult<()> {
        self.remove_entry("unlink", name)
    }

    /// Target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> VfsResult<String> {
        let resolved = self.resolve("readlink", path)?;
        let id = resolved
            .node
            .ok_or_else(|| VfsError::path("readlink", path, ErrorKind::NotExist))?;
        match self.tree.get(id).map(|n| &n.body) {
            Some(NodeBody::Symlink { target, .. }) => Ok(target.clone()),
            _ => Err(VfsError::path("readlink", path, ErrorKind::InvalidPath)),
        }
    }

    /// Resolve `path` to a node, following symlinks at the final segment.
    ///
    /// Relative targets are resolved against the directory holding the link.
    pub(crate) fn follow(&self, op: &'static str, path: &str) -> VfsResult<NodeId> {
        let mut base = self.cwd;
        let mut current = path.to_string();
        let mut depth = 0;

        loop {
            let resolved = self
                .tree
                .resolve(base, &current)
                .map_err(|kind| VfsError::path(op, path, kind))?;
            let id = resolved
                .node
                .ok_or_else(|| VfsError::path(op, path, ErrorKind::NotExist))?;

            let Some(NodeBody::Symlink { target, .. }) = self.tree.get(id).map(|n| &n.body) else {
                return Ok(id);
            };
            depth += 1;
            if depth > self.config.max_symlink_depth {
                return Err(VfsError::path(op, path, ErrorKind::TooManySymlinks));
            }
            debug!(from = %resolved.path, to = %target, depth, "following symlink");
            base = resolved.parent.unwrap_or(NodeId::ROOT);
            current = target.clone();
        }
    }

    /// Drop `path` from its canonical node's alias list, if it is an alias.
    pub(crate) fn forget_link(&mut self, id: NodeId, path: &str) {
        if self.kind_of(id) != Some(FileType::File) {
            return;
        }
        let canonical = match self.tree.get(id).map(|n| &n.body) {
            Some(NodeBody::File {
                linked_from: Some(canonical),
                ..
            }) => canonical.clone(),
            _ => return,
        };
        let Some(canonical_id) = self
            .tree
            .resolve(NodeId::ROOT, &canonical)
            .ok()
            .and_then(|r| r.node)
        else {
            return;
        };
        if let Some(NodeBody::File { links, .. }) =
            self.tree.get_mut(canonical_id).map(|n| &mut n.body)
        {
            links.retain(|alias| alias != path);
            let remaining = links.len();
            debug!(canonical = %canonical, alias = %path, remaining, "hard link removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::vfs::error::ErrorKind;
    use crate::vfs::fs::Filesystem;
    use crate::vfs::types::{FileType, FsConfig};

    fn fs_with_file(content: &[u8]) -> Filesystem {
        let mut fs = Filesystem::with_config(FsConfig::default().with_block_size(4));
        fs.create("/a.txt").unwrap();
        let fd = fs.open("/a.txt").unwrap();
        fs.write_at(fd, 0, content).unwrap();
        fs.close(fd);
        fs
    }

    #[test]
    fn test_hard_link_shares_content() {
        let mut fs = fs_with_file(b"hello");
        fs.link("/a.txt", "/b.txt").unwrap();

        let fd = fs.open("/b.txt").unwrap();
        fs.write_at(fd, 0, b"J").unwrap();
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"Jello");
        assert_eq!(fs.stat_path("/a.txt").unwrap().links, 1);
    }

    #[test]
    fn test_link_errors() {
        let mut fs = fs_with_file(b"x");
        fs.mkdir("/d").unwrap();
        assert_eq!(
            fs.link("/d", "/e").unwrap_err().kind(),
            Some(ErrorKind::IsADirectory)
        );
        assert_eq!(
            fs.link("/missing", "/e").unwrap_err().kind(),
            Some(ErrorKind::NotExist)
        );
        assert_eq!(
            fs.link("/a.txt", "/d").unwrap_err().kind(),
            Some(ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn test_link_to_alias_records_on_canonical() {
        let mut fs = fs_with_file(b"x");
        fs.link("/a.txt", "/b.txt").unwrap();
        fs.link("/b.txt", "/c.txt").unwrap();
        assert_eq!(fs.stat_path("/a.txt").unwrap().links, 2);
        assert_eq!(fs.stat_path("/b.txt").unwrap().links, 0);
    }

    #[test]
    fn test_unlink_keeps_other_names() {
        let mut fs = fs_with_file(b"shared");
        fs.link("/a.txt", "/b.txt").unwrap();

        fs.unlink("/b.txt").unwrap();
        assert_eq!(fs.stat_path("/a.txt").unwrap().links, 0);
        assert_eq!(fs.read_file("/a.txt").unwrap(), b"shared");
        assert_eq!(fs.tree().buffer_count(), 1);
    }

    #[test]
    fn test_unlink_canonical_keeps_alias() {
        let mut fs = fs_with_file(b"shared");
        fs.link("/a.txt", "/b.txt").unwrap();
        fs.unlink("/a.txt").unwrap();
        assert_eq!(fs.read_file("/b.txt").unwrap(), b"shared");

        // The orphaned alias becomes canonical for new links.
        fs.link("/b.txt", "/c.txt").unwrap();
        assert_eq!(fs.stat_path("/b.txt").unwrap().links, 1);
    }

    #[test]
    fn test_symlink_is_followed_on_open() {
        let mut fs = fs_with_file(b"target data");
        fs.symlink("/a.txt", "/s").unwrap();

        let fd = fs.open("/s").unwrap();
        assert_eq!(fs.read_at(fd, 0, 6).unwrap(), b"target");
        assert_eq!(fs.readlink("/s").unwrap(), "/a.txt");

        let info = fs.stat_path("/s").unwrap();
        assert_eq!(info.kind, FileType::Symlink);
        assert_eq!(info.len, 10, "content is the marker plus target");
    }

    #[test]
    fn test_relative_symlink_resolves_from_link_dir() {
        let mut fs = fs_with_file(b"x");
        fs.create("/d/f").unwrap();
        fs.symlink("f", "/d/s").unwrap();
        fs.symlink("../a.txt", "/d/up").unwrap();

        assert_eq!(fs.read_file("/d/s").unwrap(), b"");
        assert_eq!(fs.read_file("/d/up").unwrap(), b"x");
    }

    #[test]
    fn test_symlink_to_directory_for_cd() {
        let mut fs = Filesystem::new();
        fs.mkdir("/real/dir").unwrap();
        fs.symlink("/real/dir", "/shortcut").unwrap();
        fs.cd("/shortcut").unwrap();
        assert_eq!(fs.pwd(), "/real/dir");
    }

    #[test]
    fn test_symlink_cycle_is_bounded() {
        let mut fs = Filesystem::new();
        fs.symlink("/b", "/a").unwrap();
        fs.symlink("/a", "/b").unwrap();
        assert_eq!(
            fs.open("/a").unwrap_err().kind(),
            Some(ErrorKind::TooManySymlinks)
        );
    }

    #[test]
    fn test_dangling_symlink() {
        let mut fs = Filesystem::new();
        fs.symlink("/nowhere", "/s").unwrap();
        assert_eq!(fs.open("/s").unwrap_err().kind(), Some(ErrorKind::NotExist));
        fs.unlink("/s").unwrap();
        assert!(fs.list().is_empty());
    }

    #[test]
    fn test_marker_bytes_in_regular_file_are_data() {
        let mut fs = fs_with_file(b"sym:/etc/passwd");
        let fd = fs.open("/a.txt").unwrap();
        assert_eq!(fs.read_at(fd, 0, 4).unwrap(), b"sym:");
        assert_eq!(
            fs.readlink("/a.txt").unwrap_err().kind(),
            Some(ErrorKind::InvalidPath)
        );
    }

    #[test]
    fn test_remove_last_name_frees_buffer() {
        let mut fs = fs_with_file(b"x");
        fs.link("/a.txt", "/b.txt").unwrap();
        fs.remove("/a.txt").unwrap();
        assert_eq!(fs.tree().buffer_count(), 1);
        fs.remove("/b.txt").unwrap();
        assert_eq!(fs.tree().buffer_count(), 0);
    }
}
