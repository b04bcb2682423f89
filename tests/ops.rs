// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exercise the memfs operation table end to end.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::time::Duration;

use memfs::dirent::decode;
use memfs::{
    BufferStore, ConnOption, FsOps, InodeKind, LengthPolicy, MemFs, MemfsConfig, MemfsError,
    Namespace, FILE_INODE, ROOT_INODE,
};

fn memfs(name: &str, capacity: usize) -> MemFs {
    MemFs::new(
        Namespace::new(name).expect("namespace"),
        BufferStore::new(capacity, LengthPolicy::HighWater).expect("store"),
        Duration::from_secs(1),
    )
}

#[test]
fn lookup_then_getattr_tracks_written_size() {
    let fs = memfs("foo", 64);
    let entry = fs.lookup(ROOT_INODE, OsStr::new("foo")).expect("lookup");
    assert_eq!(entry.inode, FILE_INODE);
    assert_eq!(entry.size, 0);
    assert_eq!(
        fs.lookup(ROOT_INODE, OsStr::new("bar")).expect_err("miss").errno(),
        libc::ENOENT
    );

    fs.write(FILE_INODE, 0, b"hello").expect("write");
    let attr = fs.getattr(FILE_INODE).expect("getattr");
    assert_eq!(attr.kind, InodeKind::RegularFile);
    assert_eq!(attr.size, 5);
    assert_eq!(fs.getattr(ROOT_INODE).expect("root").kind, InodeKind::Directory);
    assert_eq!(fs.getattr(9), Err(MemfsError::UnknownInode(9)));
}

#[test]
fn capacity_sixteen_scenario() {
    let fs = memfs("00000001", 16);
    assert_eq!(fs.write(FILE_INODE, 10, b"HELLOWORLD").expect("write"), 6);
    assert_eq!(fs.getattr(FILE_INODE).expect("getattr").size, 16);
    assert_eq!(fs.read(FILE_INODE, 10, 10).expect("read"), b"HELLOW");
    let err = fs.write(FILE_INODE, 20, b"X").expect_err("beyond capacity");
    assert_eq!(err.errno(), libc::EIO);
}

#[test]
fn readdir_lists_root_and_rejects_the_file() {
    let fs = memfs("foo", 16);
    let bytes = fs.readdir(ROOT_INODE, 0, 4096).expect("readdir");
    let names: Vec<_> = decode(&bytes).map(|d| d.name.to_vec()).collect();
    assert_eq!(names, vec![b".".to_vec(), b"..".to_vec(), b"foo".to_vec()]);
    assert!(fs.readdir(ROOT_INODE, bytes.len() as u64, 4096).expect("eof").is_empty());
    let err = fs.readdir(FILE_INODE, 0, 4096).expect_err("not a dir");
    assert_eq!(err.errno(), libc::ENOTDIR);
}

#[test]
fn file_operations_on_root_fail() {
    let fs = memfs("foo", 16);
    assert_eq!(
        fs.open(ROOT_INODE, libc::O_RDONLY),
        Err(MemfsError::IsADirectory(ROOT_INODE))
    );
    assert_eq!(
        fs.read(ROOT_INODE, 0, 4),
        Err(MemfsError::IsADirectory(ROOT_INODE))
    );
    assert_eq!(
        fs.write(ROOT_INODE, 0, b"x"),
        Err(MemfsError::IsADirectory(ROOT_INODE))
    );
    assert_eq!(fs.read(5, 0, 4), Err(MemfsError::UnknownInode(5)));
}

#[test]
fn open_is_always_permitted_on_the_file() {
    let fs = memfs("foo", 16);
    let grant = fs.open(FILE_INODE, libc::O_WRONLY | libc::O_TRUNC).expect("open");
    assert_eq!(grant.handle, 0);
}

#[test]
fn setattr_size_truncates_and_reports() {
    let fs = memfs("foo", 16);
    fs.write(FILE_INODE, 0, b"hello world").expect("write");
    let attr = fs.setattr(FILE_INODE, Some(5)).expect("truncate");
    assert_eq!(attr.size, 5);
    assert_eq!(fs.read(FILE_INODE, 0, 64).expect("read"), b"hello");
    assert_eq!(
        fs.setattr(FILE_INODE, Some(17)).expect_err("too big").errno(),
        libc::EFBIG
    );
    assert_eq!(
        fs.setattr(ROOT_INODE, Some(0)),
        Err(MemfsError::IsADirectory(ROOT_INODE))
    );
    assert_eq!(fs.setattr(ROOT_INODE, None).expect("noop").inode, ROOT_INODE);
}

#[test]
fn statfs_reflects_capacity_and_usage() {
    let fs = memfs("foo", 10 * 4096);
    let empty = fs.statfs();
    assert_eq!(empty.blocks, 10);
    assert_eq!(empty.bfree, 10);
    assert_eq!(empty.files, 2);
    fs.write(FILE_INODE, 0, &[1u8; 4097]).expect("write");
    let used = fs.statfs();
    assert_eq!(used.bfree, 8);
    assert_eq!(used.bavail, 8);
}

#[test]
fn from_config_uses_configured_name_and_ttl() {
    let config = MemfsConfig {
        filename: "scratch".to_owned(),
        capacity: 32,
        attr_ttl: Duration::from_millis(250),
        ..MemfsConfig::default()
    };
    let fs = MemFs::from_config(&config).expect("memfs");
    assert_eq!(fs.attr_ttl(), Duration::from_millis(250));
    assert_eq!(fs.namespace().filename(), "scratch");
    assert_eq!(fs.store().capacity(), 32);
    assert!(fs.lookup(ROOT_INODE, OsStr::new("scratch")).is_ok());
}

#[test]
fn from_config_rejects_bad_filename() {
    let config = MemfsConfig {
        filename: "a/b".to_owned(),
        ..MemfsConfig::default()
    };
    assert!(matches!(
        MemFs::from_config(&config),
        Err(MemfsError::InvalidFilename { .. })
    ));
}

#[test]
fn init_accepts_negotiated_connection_options() {
    let fs = memfs("foo", 16);
    fs.init(&[]);
    fs.init(&[ConnOption::WritebackCache, ConnOption::MaxWrite(4096)]);
    assert_eq!(fs.write(FILE_INODE, 0, b"ok").expect("write"), 2);
}

#[test]
fn debug_of_default_memfs_stays_small() {
    let fs = MemFs::from_config(&MemfsConfig::default()).expect("memfs");
    let rendered = format!("{fs:?}");
    assert!(rendered.contains("high_water: 0"), "{rendered}");
    assert!(rendered.len() < 512, "{rendered}");
}
