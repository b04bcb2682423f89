// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate memfs config defaults, TOML loading, and mount options.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::time::Duration;

use memfs::config::{
    load_config, parse_config, parse_mount_options, ConnOption, MountFlag, DEFAULT_CAPACITY,
    DEFAULT_FILENAME,
};
use memfs::{LengthPolicy, MemfsConfig};

#[test]
fn defaults_match_the_reference_daemon() {
    let config = MemfsConfig::default();
    assert_eq!(config.filename, DEFAULT_FILENAME);
    assert_eq!(config.filename, "00000001");
    assert_eq!(config.capacity, DEFAULT_CAPACITY);
    assert_eq!(config.length_policy, LengthPolicy::HighWater);
    assert_eq!(config.attr_ttl, Duration::from_secs(1));
    assert!(config.validate().is_ok());
    assert_eq!(
        config.mount_flags(),
        vec![MountFlag::FsName("memfs".to_owned()), MountFlag::AutoUnmount]
    );
}

#[test]
fn empty_document_yields_defaults() {
    let config = parse_config("").expect("empty config");
    assert_eq!(config, MemfsConfig::default());
}

#[test]
fn full_document_overrides_every_field() {
    let text = r#"
[file]
name = "scratch.bin"
capacity = 4096
length_policy = "nul-terminated"

[mount]
fs_name = "scratchfs"
auto_unmount = false
allow_other = true
options = ["noatime,nosuid", "subtype=memfs"]

[cache]
attr_ttl_ms = 250
"#;
    let config = parse_config(text).expect("config");
    assert_eq!(config.filename, "scratch.bin");
    assert_eq!(config.capacity, 4096);
    assert_eq!(config.length_policy, LengthPolicy::NulTerminated);
    assert_eq!(config.attr_ttl, Duration::from_millis(250));
    assert_eq!(
        config.mount_flags(),
        vec![
            MountFlag::FsName("scratchfs".to_owned()),
            MountFlag::AllowOther,
            MountFlag::NoAtime,
            MountFlag::NoSuid,
            MountFlag::Subtype("memfs".to_owned()),
        ]
    );
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(parse_config("[file]\nsize = 10\n").is_err());
    assert!(parse_config("[persist]\npath = \"/tmp\"\n").is_err());
}

#[test]
fn invalid_values_are_rejected() {
    assert!(parse_config("[file]\ncapacity = 0\n").is_err());
    assert!(parse_config("[file]\nname = \"a/b\"\n").is_err());
    assert!(parse_config("[file]\nname = \"..\"\n").is_err());
    assert!(parse_config("[file]\nlength_policy = \"sparse\"\n").is_err());
    assert!(parse_config("[cache]\nattr_ttl_ms = 3600001\n").is_err());
    assert!(parse_config("[mount]\nfs_name = \"\"\n").is_err());
}

#[test]
fn load_config_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("memfs.toml");
    std::fs::write(&path, "[file]\nname = \"disk\"\n").expect("write config");
    let config = load_config(&path).expect("load");
    assert_eq!(config.filename, "disk");
    assert_eq!(config.capacity, DEFAULT_CAPACITY);
}

#[test]
fn load_config_names_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");
    let err = load_config(&path).expect_err("missing file");
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn mount_options_parse_known_and_custom_flags() {
    let parsed = parse_mount_options("ro,allow_root,fsname=x,big_writes,,default_permissions")
        .expect("options");
    assert_eq!(
        parsed.flags,
        vec![
            MountFlag::ReadOnly,
            MountFlag::AllowRoot,
            MountFlag::FsName("x".to_owned()),
            MountFlag::Custom("big_writes".to_owned()),
            MountFlag::DefaultPermissions,
        ]
    );
    assert!(parsed.conn.is_empty());
    let empty = parse_mount_options("").expect("empty");
    assert!(empty.flags.is_empty() && empty.conn.is_empty());
}

#[test]
fn connection_options_are_split_from_mount_flags() {
    let parsed = parse_mount_options(
        "writeback_cache,max_write=4096,noatime,max_readahead=131072,max_background=64,\
         congestion_threshold=48",
    )
    .expect("options");
    assert_eq!(parsed.flags, vec![MountFlag::NoAtime]);
    assert_eq!(
        parsed.conn,
        vec![
            ConnOption::WritebackCache,
            ConnOption::MaxWrite(4096),
            ConnOption::MaxReadahead(131_072),
            ConnOption::MaxBackground(64),
            ConnOption::CongestionThreshold(48),
        ]
    );
}

#[test]
fn config_file_options_carry_connection_parameters() {
    let config = parse_config("[mount]\noptions = [\"writeback_cache,max_write=65536\"]\n")
        .expect("config");
    assert_eq!(
        config.conn,
        vec![ConnOption::WritebackCache, ConnOption::MaxWrite(65536)]
    );
    let flags = config.mount_flags();
    assert!(flags.iter().all(|f| !matches!(f, MountFlag::Custom(_))));
    assert!(parse_config("[mount]\noptions = [\"max_write=0\"]\n").is_err());
}
