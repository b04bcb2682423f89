// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve the static two-inode namespace exposed by memfs.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! The namespace is fixed at construction: a root directory holding exactly
//! one regular file. Nothing here touches file content; sizes and times are
//! supplied by the caller from a [`StoreStat`].

use std::ffi::OsStr;
use std::time::SystemTime;

use log::debug;

use crate::error::{MemfsError, Result};
use crate::store::StoreStat;
use crate::{FILE_INODE, ROOT_INODE};

/// Longest filename accepted for the single file.
pub const MAX_FILENAME_BYTES: usize = 255;

const ROOT_PERM: u16 = 0o755;
const FILE_PERM: u16 = 0o777;

/// Kind of node backing an inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    /// The root directory.
    Directory,
    /// The single regular file.
    RegularFile,
}

impl InodeKind {
    /// Directory entry type (`DT_*`) used in directory listings.
    #[must_use]
    pub fn dirent_type(self) -> u32 {
        match self {
            Self::Directory => u32::from(libc::DT_DIR),
            Self::RegularFile => u32::from(libc::DT_REG),
        }
    }
}

/// Attributes reported for an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Inode number.
    pub inode: u64,
    /// Node kind.
    pub kind: InodeKind,
    /// Permission bits.
    pub perm: u16,
    /// Hard link count.
    pub nlink: u32,
    /// Content length in bytes.
    pub size: u64,
    /// Last content modification.
    pub modified: SystemTime,
}

/// One entry in the root directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// Inode the entry resolves to.
    pub inode: u64,
    /// Node kind of the target.
    pub kind: InodeKind,
}

/// Access mode requested when opening the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// `O_RDONLY`.
    ReadOnly,
    /// `O_WRONLY`.
    WriteOnly,
    /// `O_RDWR`.
    ReadWrite,
}

impl AccessMode {
    /// Decode the access mode bits of `open(2)` flags.
    #[must_use]
    pub fn from_flags(flags: i32) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => Self::WriteOnly,
            libc::O_RDWR => Self::ReadWrite,
            _ => Self::ReadOnly,
        }
    }
}

/// Capability returned by a successful open.
///
/// Every access mode is granted; the mode is recorded so callers can see what
/// was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenGrant {
    /// Inode that was opened.
    pub inode: u64,
    /// Access mode requested by the host.
    pub access: AccessMode,
    /// Handle handed back to the transport. Always 0: there is one buffer.
    pub handle: u64,
}

/// Static namespace: root directory plus one named file.
#[derive(Debug, Clone)]
pub struct Namespace {
    filename: String,
    created: SystemTime,
}

impl Namespace {
    /// Build the namespace around `filename`.
    pub fn new(filename: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self {
            filename,
            created: SystemTime::now(),
        })
    }

    /// Name of the single file.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Resolve `name` under `parent`.
    pub fn lookup(&self, parent: u64, name: &OsStr) -> Result<u64> {
        if parent == ROOT_INODE && name == OsStr::new(&self.filename) {
            return Ok(FILE_INODE);
        }
        debug!("lookup miss parent={parent} name={name:?}");
        Err(MemfsError::NoSuchEntry {
            parent,
            name: name.to_string_lossy().into_owned(),
        })
    }

    /// Attributes of `inode`, with file size and times taken from `stat`.
    pub fn attributes(&self, inode: u64, stat: &StoreStat) -> Result<Metadata> {
        match inode {
            ROOT_INODE => Ok(Metadata {
                inode,
                kind: InodeKind::Directory,
                perm: ROOT_PERM,
                nlink: 2,
                size: 0,
                modified: self.created,
            }),
            FILE_INODE => Ok(Metadata {
                inode,
                kind: InodeKind::RegularFile,
                perm: FILE_PERM,
                nlink: 1,
                size: stat.len as u64,
                modified: stat.modified,
            }),
            other => Err(MemfsError::UnknownInode(other)),
        }
    }

    /// Entries of the root directory in listing order.
    pub fn list_directory(&self, inode: u64) -> Result<Vec<DirEntry>> {
        if inode != ROOT_INODE {
            return Err(MemfsError::NotADirectory(inode));
        }
        Ok(vec![
            DirEntry {
                name: ".".to_owned(),
                inode: ROOT_INODE,
                kind: InodeKind::Directory,
            },
            DirEntry {
                name: "..".to_owned(),
                inode: ROOT_INODE,
                kind: InodeKind::Directory,
            },
            DirEntry {
                name: self.filename.clone(),
                inode: FILE_INODE,
                kind: InodeKind::RegularFile,
            },
        ])
    }

    /// Open `inode`. Only the file can be opened, in any mode.
    pub fn open(&self, inode: u64, flags: i32) -> Result<OpenGrant> {
        if inode != FILE_INODE {
            return Err(MemfsError::IsADirectory(inode));
        }
        let access = AccessMode::from_flags(flags);
        debug!("open inode={inode} access={access:?} granted");
        Ok(OpenGrant {
            inode,
            access,
            handle: 0,
        })
    }
}

/// Check that `name` can appear as an entry of the root directory.
pub fn validate_filename(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name == "." || name == ".." {
        Some("is reserved")
    } else if name.contains('/') {
        Some("must not contain '/'")
    } else if name.as_bytes().contains(&0) {
        Some("contains NUL byte")
    } else if name.len() > MAX_FILENAME_BYTES {
        Some("exceeds 255 bytes")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(MemfsError::InvalidFilename {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}
