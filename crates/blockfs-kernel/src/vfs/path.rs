//! Path normalization and resolution.
//!
//! Paths are `/`-separated strings. Relative paths are joined onto a base
//! directory's absolute path and normalized lexically before the walk, so
//! resolution always starts at the root.

use super::error::{ErrorKind, KindResult};
use super::node::Tree;
use super::types::NodeId;

/// Join `path` onto `base` (if relative) and collapse `.`, `..`, and
/// duplicate separators. `..` at the root stays at the root.
pub fn normalize(base: &str, path: &str) -> String {
    let path = path.trim();
    let mut segments: Vec<&str> = Vec::new();

    if !path.starts_with('/') {
        for seg in base.split('/') {
            push_segment(&mut segments, seg);
        }
    }
    for seg in path.split('/') {
        push_segment(&mut segments, seg);
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    for seg in segments {
        out.push('/');
        out.push_str(seg);
    }
    out
}

fn push_segment<'a>(segments: &mut Vec<&'a str>, seg: &'a str) {
    match seg {
        "" | "." => {}
        ".." => {
            segments.pop();
        }
        name => segments.push(name),
    }
}

/// Segments of a normalized absolute path. The root has none.
pub fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('/').filter(|s| !s.is_empty())
}

/// Parent directory of a normalized absolute path.
pub fn parent_of(normalized: &str) -> &str {
    match normalized.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &normalized[..idx],
    }
}

/// Final component of a normalized absolute path (`/` for the root).
pub fn base_name(normalized: &str) -> &str {
    match normalized.rfind('/') {
        Some(idx) if idx + 1 < normalized.len() => &normalized[idx + 1..],
        _ => "/",
    }
}

/// Outcome of walking a path.
///
/// `node` is `None` when every directory along the way exists but the final
/// segment doesn't; `parent` is still set so creation can proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Normalized absolute path.
    pub path: String,
    /// Directory holding the final segment. `None` only for the root.
    pub parent: Option<NodeId>,
    /// The node itself, if it exists.
    pub node: Option<NodeId>,
}

impl Resolved {
    /// Final path segment.
    pub fn name(&self) -> &str {
        base_name(&self.path)
    }
}

impl Tree {
    /// Resolve `path` relative to directory `base`.
    ///
    /// Fails with `NotExist` if an intermediate segment is missing and with
    /// `NotADirectory` if one exists but isn't a directory. Symlinks are not
    /// followed here.
    pub fn resolve(&self, base: NodeId, path: &str) -> KindResult<Resolved> {
        let normalized = normalize(&self.abs_path(base), path);
        let segs: Vec<&str> = segments(&normalized).collect();

        let Some((last, dirs)) = segs.split_last() else {
            return Ok(Resolved {
                path: normalized,
                parent: None,
                node: Some(NodeId::ROOT),
            });
        };

        let mut current = NodeId::ROOT;
        for seg in dirs {
            let next = self.child(current, seg).ok_or(ErrorKind::NotExist)?;
            let is_dir = self.get(next).is_some_and(|n| n.is_dir());
            if !is_dir {
                return Err(ErrorKind::NotADirectory);
            }
            current = next;
        }

        let node = self.child(current, last);
        Ok(Resolved {
            path: normalized,
            parent: Some(current),
            node,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::buffer::Buffer;
    use crate::vfs::node::Node;

    #[test]
    fn test_normalize_absolute() {
        assert_eq!(normalize("/x", "/a/./b/../c"), "/a/c");
        assert_eq!(normalize("/x", "//a///b/"), "/a/b");
        assert_eq!(normalize("/x", "/.."), "/");
        assert_eq!(normalize("/x", "/"), "/");
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize("/a/b", "c"), "/a/b/c");
        assert_eq!(normalize("/a/b", "../c"), "/a/c");
        assert_eq!(normalize("/a/b", "."), "/a/b");
        assert_eq!(normalize("/a/b", ""), "/a/b");
        assert_eq!(normalize("/", "../../x"), "/x");
    }

    #[test]
    fn test_parent_and_base() {
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/"), "/");
        assert_eq!(base_name("/a/b"), "b");
        assert_eq!(base_name("/"), "/");
    }

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        tree.attach(Node::directory(NodeId(1), "a", Some(NodeId::ROOT)));
        tree.attach(Node::directory(NodeId(2), "c", Some(NodeId(1))));
        let buffer = tree.alloc_buffer(Buffer::new(4));
        tree.attach(Node::file(NodeId(3), "f", NodeId(1), buffer));
        tree
    }

    #[test]
    fn test_resolve_existing() {
        let tree = sample_tree();
        let r = tree.resolve(NodeId::ROOT, "/a/./b/../c").unwrap();
        assert_eq!(r, tree.resolve(NodeId::ROOT, "/a/c").unwrap());
        assert_eq!(r.node, Some(NodeId(2)));
        assert_eq!(r.parent, Some(NodeId(1)));
        assert_eq!(r.name(), "c");
    }

    #[test]
    fn test_resolve_relative_to_base() {
        let tree = sample_tree();
        let r = tree.resolve(NodeId(2), "../f").unwrap();
        assert_eq!(r.node, Some(NodeId(3)));
        assert_eq!(r.path, "/a/f");
    }

    #[test]
    fn test_resolve_missing_leaf_keeps_parent() {
        let tree = sample_tree();
        let r = tree.resolve(NodeId::ROOT, "/a/new").unwrap();
        assert_eq!(r.node, None);
        assert_eq!(r.parent, Some(NodeId(1)));
    }

    #[test]
    fn test_resolve_root() {
        let tree = sample_tree();
        let r = tree.resolve(NodeId(2), "/").unwrap();
        assert_eq!(r.node, Some(NodeId::ROOT));
        assert_eq!(r.parent, None);
        assert_eq!(tree.resolve(NodeId::ROOT, "..").unwrap().node, Some(NodeId::ROOT));
    }

    #[test]
    fn test_resolve_bad_intermediate() {
        let tree = sample_tree();
        assert_eq!(
            tree.resolve(NodeId::ROOT, "/missing/x"),
            Err(ErrorKind::NotExist)
        );
        assert_eq!(
            tree.resolve(NodeId::ROOT, "/a/f/x"),
            Err(ErrorKind::NotADirectory)
        );
    }
}
