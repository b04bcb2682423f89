// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide the memfs operation table over the namespace and store.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::time::Duration;

use log::{debug, info};

use crate::config::{ConnOption, MemfsConfig};
use crate::dirent::directory_listing;
use crate::error::{MemfsError, Result};
use crate::namespace::{Metadata, Namespace, OpenGrant};
use crate::store::BufferStore;
use crate::{FILE_INODE, ROOT_INODE};

/// Block size reported to `statfs`.
pub const STATFS_BLOCK_SIZE: u32 = 4096;

/// Filesystem-wide usage figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Total blocks (capacity).
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Free blocks available to unprivileged users.
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
}

/// Operations a transport invokes on the filesystem core.
///
/// Each call maps onto exactly one reply to the host.
pub trait FsOps: Send + Sync + 'static {
    /// Session start, with the connection parameters the kernel accepted.
    fn init(&self, _conn: &[ConnOption]) {}

    /// How long the host may cache attributes and entries.
    fn attr_ttl(&self) -> Duration;

    /// Resolve `name` under `parent`, returning the child's attributes.
    fn lookup(&self, parent: u64, name: &OsStr) -> Result<Metadata>;

    /// Attributes of `inode`.
    fn getattr(&self, inode: u64) -> Result<Metadata>;

    /// Apply an optional size change and return the resulting attributes.
    fn setattr(&self, inode: u64, size: Option<u64>) -> Result<Metadata>;

    /// Encoded directory records of `inode` from `offset`, at most `max_bytes`.
    fn readdir(&self, inode: u64, offset: u64, max_bytes: usize) -> Result<Vec<u8>>;

    /// Open `inode` with `open(2)` flags.
    fn open(&self, inode: u64, flags: i32) -> Result<OpenGrant>;

    /// Read up to `size` bytes at `offset`.
    fn read(&self, inode: u64, offset: u64, size: usize) -> Result<Vec<u8>>;

    /// Write `data` at `offset`, returning the number of bytes stored.
    fn write(&self, inode: u64, offset: u64, data: &[u8]) -> Result<usize>;

    /// Filesystem usage.
    fn statfs(&self) -> FsStats;
}

/// Single-file in-memory filesystem.
#[derive(Debug)]
pub struct MemFs {
    namespace: Namespace,
    store: BufferStore,
    attr_ttl: Duration,
}

impl MemFs {
    /// Assemble a filesystem from its parts.
    #[must_use]
    pub fn new(namespace: Namespace, store: BufferStore, attr_ttl: Duration) -> Self {
        Self {
            namespace,
            store,
            attr_ttl,
        }
    }

    /// Build the namespace and allocate the store described by `config`.
    pub fn from_config(config: &MemfsConfig) -> Result<Self> {
        let namespace = Namespace::new(config.filename.clone())?;
        let store = BufferStore::new(config.capacity, config.length_policy)?;
        Ok(Self::new(namespace, store, config.attr_ttl))
    }

    /// Borrow the namespace.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Borrow the backing store.
    #[must_use]
    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    fn require_file(inode: u64) -> Result<()> {
        match inode {
            FILE_INODE => Ok(()),
            ROOT_INODE => Err(MemfsError::IsADirectory(inode)),
            other => Err(MemfsError::UnknownInode(other)),
        }
    }
}

impl FsOps for MemFs {
    fn init(&self, conn: &[ConnOption]) {
        info!(
            "memfs ready: file {:?}, capacity {} bytes, {:?}",
            self.namespace.filename(),
            self.store.capacity(),
            self.store.policy()
        );
        if !conn.is_empty() {
            info!("connection options: {conn:?}");
        }
    }

    fn attr_ttl(&self) -> Duration {
        self.attr_ttl
    }

    fn lookup(&self, parent: u64, name: &OsStr) -> Result<Metadata> {
        let inode = self.namespace.lookup(parent, name)?;
        self.namespace.attributes(inode, &self.store.stat())
    }

    fn getattr(&self, inode: u64) -> Result<Metadata> {
        self.namespace.attributes(inode, &self.store.stat())
    }

    fn setattr(&self, inode: u64, size: Option<u64>) -> Result<Metadata> {
        if let Some(size) = size {
            Self::require_file(inode)?;
            debug!("truncate inode={inode} size={size}");
            self.store.truncate(size)?;
        }
        self.getattr(inode)
    }

    fn readdir(&self, inode: u64, offset: u64, max_bytes: usize) -> Result<Vec<u8>> {
        let entries = self.namespace.list_directory(inode)?;
        Ok(directory_listing(&entries, offset, max_bytes))
    }

    fn open(&self, inode: u64, flags: i32) -> Result<OpenGrant> {
        self.namespace.open(inode, flags)
    }

    fn read(&self, inode: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        Self::require_file(inode)?;
        let data = self.store.read(offset, size);
        debug!("read offset={offset} size={size} -> {} bytes", data.len());
        Ok(data)
    }

    fn write(&self, inode: u64, offset: u64, data: &[u8]) -> Result<usize> {
        Self::require_file(inode)?;
        debug!("write offset={offset} size={}", data.len());
        self.store.write(offset, data)
    }

    fn statfs(&self) -> FsStats {
        let bsize = u64::from(STATFS_BLOCK_SIZE);
        let blocks = (self.store.capacity() as u64).div_ceil(bsize);
        let used = (self.store.len() as u64).div_ceil(bsize);
        let free = blocks.saturating_sub(used);
        FsStats {
            blocks,
            bfree: free,
            bavail: free,
            files: 2,
            ffree: 0,
            bsize: STATFS_BLOCK_SIZE,
            namelen: crate::namespace::MAX_FILENAME_BYTES as u32,
        }
    }
}
