//! In-memory block filesystem.
//!
//! Key components:
//!
//! - [`Block`] / [`Buffer`] - fixed-capacity storage blocks and the
//!   block-sequence content of a file
//! - [`Tree`] / [`Node`] - the node arena and its shared-buffer table
//! - [`path`] - normalization and resolution
//! - [`DescriptorTable`] - open handles bound to node IDs
//! - [`Filesystem`] - the facade owning all of the above
//! - [`SnapshotStore`] - whole-tree persistence
//!
//! ## Design Decisions
//!
//! - **IDs, not references**: nodes refer to their parent and children by
//!   [`NodeId`]. The arena is the only owner.
//! - **Validate, then mutate**: a failed operation never leaves a partial
//!   change behind.
//! - **Symlinks are typed**: a symlink is known by its node kind, so no file
//!   content is ever mistaken for a link.

mod block;
mod buffer;
mod descriptor;
mod error;
mod fs;
mod links;
mod node;
pub mod path;
pub mod snapshot;
mod types;

pub use block::Block;
pub use buffer::Buffer;
pub use descriptor::DescriptorTable;
pub use error::{ErrorKind, KindResult, VfsError, VfsResult};
pub use fs::Filesystem;
pub use node::{Node, NodeBody, SYMLINK_MARKER, Tree};
pub use path::Resolved;
pub use snapshot::SnapshotStore;
pub use types::{
    BufferId, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_DESCRIPTORS, DEFAULT_MAX_SYMLINK_DEPTH, Fd, FileType,
    FsConfig, NodeId, NodeInfo,
};
