//! Filesystem error types.

use std::io;
use thiserror::Error;

use super::types::Fd;

/// The fixed vocabulary of failures the engine reports.
///
/// Every kind is recoverable: a failed operation leaves the tree unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Path, segment, or parent missing.
    #[error("no such file or directory")]
    NotExist,

    /// Create/mkdir/link target already occupied.
    #[error("file exists")]
    AlreadyExists,

    /// Expected a directory.
    #[error("not a directory")]
    NotADirectory,

    /// Expected a file.
    #[error("is a directory")]
    IsADirectory,

    /// Read/write offset beyond buffer bounds.
    #[error("offset out of range")]
    OffsetOutOfRange,

    /// Write would exceed a block's fixed capacity.
    #[error("not enough space in block")]
    WriteOverflow,

    /// Operation on an unbound descriptor.
    #[error("file is not open")]
    NotOpen,

    /// Duplicate open while single-open is enforced.
    #[error("file is already open")]
    AlreadyOpen,

    /// Directory removal with children present.
    #[error("directory not empty")]
    DirectoryNotEmpty,

    /// Descriptor pool exhausted.
    #[error("no free file descriptors")]
    NoFreeDescriptors,

    /// Symlink chain longer than the configured depth.
    #[error("too many levels of symbolic links")]
    TooManySymlinks,

    /// Path that can never name a node (empty leaf, the root where a child is required).
    #[error("invalid path")]
    InvalidPath,
}

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A path-addressed operation failed.
    #[error("{op}: {path}: {kind}")]
    Path {
        op: &'static str,
        path: String,
        kind: ErrorKind,
    },

    /// A descriptor-addressed operation failed.
    #[error("{op}: fd {fd}: {kind}")]
    Descriptor {
        op: &'static str,
        fd: Fd,
        kind: ErrorKind,
    },

    /// Snapshot storage failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot format: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Snapshot decoded but describes an impossible tree.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl VfsError {
    /// Wrap a kind with the operation name and offending path.
    pub fn path(op: &'static str, path: impl Into<String>, kind: ErrorKind) -> Self {
        Self::Path {
            op,
            path: path.into(),
            kind,
        }
    }

    /// Wrap a kind with the operation name and offending descriptor.
    pub fn descriptor(op: &'static str, fd: Fd, kind: ErrorKind) -> Self {
        Self::Descriptor { op, fd, kind }
    }

    /// Create a Corrupt error.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// The engine-level kind, if this is not a persistence failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            VfsError::Path { kind, .. } | VfsError::Descriptor { kind, .. } => Some(*kind),
            VfsError::Io(_) | VfsError::Snapshot(_) | VfsError::Corrupt(_) => None,
        }
    }
}

impl From<ErrorKind> for io::ErrorKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotExist => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorKind::DirectoryNotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::OffsetOutOfRange | ErrorKind::InvalidPath | ErrorKind::TooManySymlinks => {
                io::ErrorKind::InvalidInput
            }
            ErrorKind::WriteOverflow => io::ErrorKind::StorageFull,
            ErrorKind::NotOpen | ErrorKind::AlreadyOpen | ErrorKind::NoFreeDescriptors => {
                io::ErrorKind::ResourceBusy
            }
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::Io(e) => e,
            VfsError::Snapshot(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            VfsError::Corrupt(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            other => {
                let kind = other.kind().map(io::ErrorKind::from).unwrap_or(io::ErrorKind::Other);
                io::Error::new(kind, other.to_string())
            }
        }
    }
}

/// Result type for block- and buffer-level operations.
pub type KindResult<T> = Result<T, ErrorKind>;

/// Filesystem result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_error_renders_op_and_path() {
        let err = VfsError::path("open", "/d/f", ErrorKind::NotExist);
        assert_eq!(err.to_string(), "open: /d/f: no such file or directory");
        assert_eq!(err.kind(), Some(ErrorKind::NotExist));
    }

    #[test]
    fn test_descriptor_error_renders_fd() {
        let err = VfsError::descriptor("read", Fd(7), ErrorKind::NotOpen);
        assert_eq!(err.to_string(), "read: fd 7: file is not open");
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err: io::Error = VfsError::path("rmdir", "/d", ErrorKind::DirectoryNotEmpty).into();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);

        let err: io::Error = VfsError::corrupt("duplicate id").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
