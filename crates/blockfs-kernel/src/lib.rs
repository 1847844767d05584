//! # blockfs-kernel
//!
//! An in-memory, hierarchical filesystem backed by fixed-size blocks.
//!
//! The engine keeps a tree of files, directories and symlinks, resolves
//! paths against a working directory, hands out descriptors for reading
//! and writing, and can dump or restore the whole tree as a snapshot.
//! It is single-threaded: callers own a [`Filesystem`] and drive it with
//! `&mut` access.
//!
//! ```
//! use blockfs_kernel::{Filesystem, FsConfig};
//!
//! let mut fs = Filesystem::with_config(FsConfig::default().with_block_size(16));
//! fs.create("/notes/todo.txt")?;
//! let fd = fs.open("/notes/todo.txt")?;
//! fs.write_at(fd, 0, b"buy milk")?;
//! assert_eq!(fs.read_at(fd, 4, 4)?, b"milk");
//! # Ok::<(), blockfs_kernel::VfsError>(())
//! ```

pub mod vfs;

pub use vfs::{
    ErrorKind, Fd, FileType, Filesystem, FsConfig, NodeId, NodeInfo, SnapshotStore, VfsError,
    VfsResult, snapshot,
};
