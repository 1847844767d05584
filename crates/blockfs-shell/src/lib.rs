//! Interactive shell over a [`blockfs_kernel::Filesystem`].
//!
//! The shell only translates input lines into calls on the engine and
//! formats the results; all filesystem semantics live in the kernel crate.

pub mod commands;
pub mod config;

pub use commands::{Outcome, Shell};
pub use config::ShellConfig;
