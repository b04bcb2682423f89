// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the memfs single-file filesystem core.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! memfs serves exactly one fixed-capacity, in-memory file through FUSE.
//!
//! The namespace is a root directory (inode 1) holding one regular file
//! (inode 2). File content lives in a zero-filled buffer allocated once at
//! startup; it never grows and is never persisted.

/// Runtime configuration and mount options.
pub mod config;
/// FUSE dirent encoding for directory replies.
pub mod dirent;
/// Error taxonomy and errno mapping.
pub mod error;
/// FUSE transport adapter.
pub mod mount;
/// Static inode namespace.
pub mod namespace;
/// Operation table and the concrete filesystem.
pub mod ops;
/// Fixed-capacity content buffer.
pub mod store;

pub use config::{ConnOption, MemfsConfig};
pub use error::{MemfsError, Result};
pub use namespace::{AccessMode, DirEntry, InodeKind, Metadata, Namespace, OpenGrant};
pub use ops::{FsOps, FsStats, MemFs};
pub use store::{BufferStore, LengthPolicy, StoreStat};

/// Inode of the root directory.
pub const ROOT_INODE: u64 = 1;
/// Inode of the single file.
pub const FILE_INODE: u64 = 2;
