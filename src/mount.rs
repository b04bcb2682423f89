// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bridge the memfs operation table onto a FUSE session.
// Author: Lukas Bower
#![forbid(unsafe_code)]

#[cfg(feature = "fuse")]
use std::ffi::OsStr;
#[cfg(feature = "fuse")]
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
#[cfg(feature = "fuse")]
use std::time::SystemTime;

use anyhow::{anyhow, Result};
#[cfg(feature = "fuse")]
use anyhow::Context;
#[cfg(feature = "fuse")]
use log::{debug, info};
use log::warn;

use crate::config::{ConnOption, MemfsConfig};
#[cfg(feature = "fuse")]
use crate::config::MountFlag;
use crate::error::MemfsError;
#[cfg(feature = "fuse")]
use crate::namespace::{InodeKind, Metadata};
use crate::ops::FsOps;

/// Largest directory reply assembled per `readdir` call.
pub const READDIR_REPLY_BYTES: usize = 4096;

/// Convert a transport offset into a store offset.
pub fn host_offset(offset: i64) -> std::result::Result<u64, MemfsError> {
    u64::try_from(offset).map_err(|_| MemfsError::InvalidOffset(offset))
}

/// Check that `at` exists and is a directory.
pub fn validate_mountpoint(at: &Path) -> Result<()> {
    let meta = std::fs::metadata(at)
        .map_err(|err| anyhow!("mountpoint {}: {err}", at.display()))?;
    if !meta.is_dir() {
        return Err(anyhow!("mountpoint {} is not a directory", at.display()));
    }
    Ok(())
}

/// Mount `fs` at `at` and serve requests until the host unmounts it.
pub fn mount<F: FsOps>(fs: F, config: &MemfsConfig, at: &Path) -> Result<()> {
    validate_mountpoint(at)?;
    #[cfg(feature = "fuse")]
    {
        let flags = config.mount_flags();
        let options: Vec<fuser::MountOption> = flags.iter().map(mount_option).collect();
        info!("mounting memfs at {} with {:?}", at.display(), options);
        fuser::mount2(MemfsFuse::new(fs, config.conn.clone()), at, &options)
            .with_context(|| format!("mount {}", at.display()))?;
        info!("memfs at {} unmounted", at.display());
        Ok(())
    }
    #[cfg(not(feature = "fuse"))]
    {
        let _ = fs;
        let _ = config;
        Err(anyhow!("fuse support disabled; rebuild memfs with --features fuse"))
    }
}

/// Connection parameters the kernel negotiates during `FUSE_INIT`.
///
/// Setters return the nearest value the kernel accepts on rejection.
pub trait KernelTuning {
    /// Largest write request the kernel may send.
    fn set_max_write(&mut self, value: u32) -> std::result::Result<u32, u32>;
    /// Largest readahead window.
    fn set_max_readahead(&mut self, value: u32) -> std::result::Result<u32, u32>;
    /// Maximum number of pending background requests.
    fn set_max_background(&mut self, value: u16) -> std::result::Result<u16, u16>;
    /// Pending background requests at which the kernel reports congestion.
    fn set_congestion_threshold(&mut self, value: u16) -> std::result::Result<u16, u16>;
    /// Ask for write-back caching; returns unsupported capability bits on failure.
    fn enable_writeback_cache(&mut self) -> std::result::Result<(), u64>;
}

#[cfg(feature = "fuse")]
impl KernelTuning for fuser::KernelConfig {
    fn set_max_write(&mut self, value: u32) -> std::result::Result<u32, u32> {
        fuser::KernelConfig::set_max_write(self, value)
    }

    fn set_max_readahead(&mut self, value: u32) -> std::result::Result<u32, u32> {
        fuser::KernelConfig::set_max_readahead(self, value)
    }

    fn set_max_background(&mut self, value: u16) -> std::result::Result<u16, u16> {
        fuser::KernelConfig::set_max_background(self, value)
    }

    fn set_congestion_threshold(&mut self, value: u16) -> std::result::Result<u16, u16> {
        fuser::KernelConfig::set_congestion_threshold(self, value)
    }

    fn enable_writeback_cache(&mut self) -> std::result::Result<(), u64> {
        self.add_capabilities(fuser::consts::FUSE_WRITEBACK_CACHE)
            .map_err(|unsupported| unsupported as u64)
    }
}

/// Apply `options` to the kernel connection, returning what took effect.
///
/// A rejected size is retried once with the kernel's nearest value; an
/// unsupported capability is skipped.
pub fn apply_conn_options<K: KernelTuning>(
    kernel: &mut K,
    options: &[ConnOption],
) -> Vec<ConnOption> {
    let mut applied = Vec::with_capacity(options.len());
    for option in options {
        let effective = match *option {
            ConnOption::MaxWrite(value) => {
                negotiate(option, value, |v| kernel.set_max_write(v))
                    .map(ConnOption::MaxWrite)
            }
            ConnOption::MaxReadahead(value) => {
                negotiate(option, value, |v| kernel.set_max_readahead(v))
                    .map(ConnOption::MaxReadahead)
            }
            ConnOption::MaxBackground(value) => {
                negotiate(option, value, |v| kernel.set_max_background(v))
                    .map(ConnOption::MaxBackground)
            }
            ConnOption::CongestionThreshold(value) => {
                negotiate(option, value, |v| kernel.set_congestion_threshold(v))
                    .map(ConnOption::CongestionThreshold)
            }
            ConnOption::WritebackCache => match kernel.enable_writeback_cache() {
                Ok(()) => Some(ConnOption::WritebackCache),
                Err(unsupported) => {
                    warn!("kernel lacks writeback_cache support (missing bits {unsupported:#x})");
                    None
                }
            },
        };
        applied.extend(effective);
    }
    applied
}

fn negotiate<T, S>(option: &ConnOption, value: T, mut set: S) -> Option<T>
where
    T: Copy + std::fmt::Display,
    S: FnMut(T) -> std::result::Result<T, T>,
{
    let nearest = match set(value) {
        Ok(_) => return Some(value),
        Err(nearest) => nearest,
    };
    warn!("{option:?} rejected by the kernel; retrying with {nearest}");
    match set(nearest) {
        Ok(_) => Some(nearest),
        Err(_) => {
            warn!("{option:?} dropped; keeping the kernel default");
            None
        }
    }
}

#[cfg(feature = "fuse")]
fn mount_option(flag: &MountFlag) -> fuser::MountOption {
    match flag {
        MountFlag::FsName(name) => fuser::MountOption::FSName(name.clone()),
        MountFlag::Subtype(name) => fuser::MountOption::Subtype(name.clone()),
        MountFlag::AllowOther => fuser::MountOption::AllowOther,
        MountFlag::AllowRoot => fuser::MountOption::AllowRoot,
        MountFlag::AutoUnmount => fuser::MountOption::AutoUnmount,
        MountFlag::DefaultPermissions => fuser::MountOption::DefaultPermissions,
        MountFlag::ReadOnly => fuser::MountOption::RO,
        MountFlag::ReadWrite => fuser::MountOption::RW,
        MountFlag::Atime => fuser::MountOption::Atime,
        MountFlag::NoAtime => fuser::MountOption::NoAtime,
        MountFlag::Exec => fuser::MountOption::Exec,
        MountFlag::NoExec => fuser::MountOption::NoExec,
        MountFlag::Suid => fuser::MountOption::Suid,
        MountFlag::NoSuid => fuser::MountOption::NoSuid,
        MountFlag::Dev => fuser::MountOption::Dev,
        MountFlag::NoDev => fuser::MountOption::NoDev,
        MountFlag::Sync => fuser::MountOption::Sync,
        MountFlag::Async => fuser::MountOption::Async,
        MountFlag::DirSync => fuser::MountOption::DirSync,
        MountFlag::Custom(value) => fuser::MountOption::CUSTOM(value.clone()),
    }
}

#[cfg(feature = "fuse")]
struct MemfsFuse<F: FsOps> {
    fs: F,
    conn: Vec<ConnOption>,
}

#[cfg(feature = "fuse")]
impl<F: FsOps> MemfsFuse<F> {
    fn new(fs: F, conn: Vec<ConnOption>) -> Self {
        Self { fs, conn }
    }

    fn attr_for(meta: &Metadata) -> fuser::FileAttr {
        fuser::FileAttr {
            ino: meta.inode,
            size: meta.size,
            blocks: meta.size.div_ceil(512),
            atime: meta.modified,
            mtime: meta.modified,
            ctime: meta.modified,
            crtime: meta.modified,
            kind: file_type(meta.kind),
            perm: meta.perm,
            nlink: meta.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            flags: 0,
            blksize: 512,
        }
    }
}

#[cfg(feature = "fuse")]
fn file_type(kind: InodeKind) -> fuser::FileType {
    match kind {
        InodeKind::Directory => fuser::FileType::Directory,
        InodeKind::RegularFile => fuser::FileType::RegularFile,
    }
}

#[cfg(feature = "fuse")]
fn dirent_file_type(kind: u32) -> fuser::FileType {
    if kind == u32::from(libc::DT_DIR) {
        fuser::FileType::Directory
    } else {
        fuser::FileType::RegularFile
    }
}

#[cfg(feature = "fuse")]
impl<F: FsOps> fuser::Filesystem for MemfsFuse<F> {
    fn init(
        &mut self,
        _req: &fuser::Request<'_>,
        config: &mut fuser::KernelConfig,
    ) -> std::result::Result<(), libc::c_int> {
        let applied = apply_conn_options(config, &self.conn);
        self.fs.init(&applied);
        Ok(())
    }

    fn destroy(&mut self) {
        info!("memfs session closed");
    }

    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        match self.fs.lookup(parent, name) {
            Ok(meta) => reply.entry(&self.fs.attr_ttl(), &Self::attr_for(&meta), 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        match self.fs.getattr(inode) {
            Ok(meta) => reply.attr(&self.fs.attr_ttl(), &Self::attr_for(&meta)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        match self.fs.setattr(inode, size) {
            Ok(meta) => reply.attr(&self.fs.attr_ttl(), &Self::attr_for(&meta)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let offset = match host_offset(offset) {
            Ok(offset) => offset,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };
        let listing = match self.fs.readdir(inode, offset, READDIR_REPLY_BYTES) {
            Ok(listing) => listing,
            Err(err) => {
                reply.error(err.errno());
                return;
            }
        };
        for entry in crate::dirent::decode(&listing) {
            let next = i64::try_from(entry.next_offset).unwrap_or(i64::MAX);
            let name = OsStr::from_bytes(entry.name);
            if reply.add(entry.inode, next, dirent_file_type(entry.kind), name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        match self.fs.open(inode, flags) {
            Ok(grant) => reply.opened(grant.handle, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let result = host_offset(offset)
            .and_then(|offset| self.fs.read(inode, offset, size as usize));
        match result {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        let result = host_offset(offset).and_then(|offset| self.fs.write(inode, offset, data));
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(err) => {
                debug!("write failed: {err}");
                reply.error(err.errno());
            }
        }
    }

    fn statfs(&mut self, _req: &fuser::Request<'_>, _inode: u64, reply: fuser::ReplyStatfs) {
        let stats = self.fs.statfs();
        reply.statfs(
            stats.blocks,
            stats.bfree,
            stats.bavail,
            stats.files,
            stats.ffree,
            stats.bsize,
            stats.namelen,
            stats.bsize,
        );
    }
}
