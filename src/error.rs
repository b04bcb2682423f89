// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the memfs error taxonomy and its errno mapping.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors surfaced by memfs filesystem operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemfsError {
    /// A lookup named an entry that does not exist under the given parent.
    #[error("no entry {name:?} under inode {parent}")]
    NoSuchEntry {
        /// Parent inode supplied by the caller.
        parent: u64,
        /// Name that failed to resolve.
        name: String,
    },
    /// The inode is not part of the namespace.
    #[error("unknown inode {0}")]
    UnknownInode(u64),
    /// A directory-only operation targeted a non-directory.
    #[error("inode {0} is not a directory")]
    NotADirectory(u64),
    /// A file-only operation targeted a directory.
    #[error("inode {0} is a directory")]
    IsADirectory(u64),
    /// A write started at or past the end of the fixed buffer.
    #[error("write offset {offset} is beyond capacity {capacity}")]
    CapacityExceeded {
        /// Offset requested by the caller.
        offset: u64,
        /// Fixed capacity of the store.
        capacity: usize,
    },
    /// A truncate asked for more bytes than the store can hold.
    #[error("size {size} exceeds capacity {capacity}")]
    FileTooLarge {
        /// Requested file size.
        size: u64,
        /// Fixed capacity of the store.
        capacity: usize,
    },
    /// The transport supplied a negative offset.
    #[error("invalid offset {0}")]
    InvalidOffset(i64),
    /// The configured filename cannot be exposed in a directory.
    #[error("invalid filename {name:?}: {reason}")]
    InvalidFilename {
        /// Rejected filename.
        name: String,
        /// Why the filename was rejected.
        reason: &'static str,
    },
    /// The backing buffer could not be reserved at startup.
    #[error("unable to allocate {capacity} byte buffer")]
    Allocation {
        /// Capacity that failed to allocate.
        capacity: usize,
    },
}

impl MemfsError {
    /// Map the error onto the errno reported to the host.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NoSuchEntry { .. } | Self::UnknownInode(_) => libc::ENOENT,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::IsADirectory(_) => libc::EISDIR,
            Self::CapacityExceeded { .. } => libc::EIO,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::InvalidOffset(_) | Self::InvalidFilename { .. } => libc::EINVAL,
            Self::Allocation { .. } => libc::ENOMEM,
        }
    }
}

/// Result alias used across the filesystem core.
pub type Result<T> = std::result::Result<T, MemfsError>;
