// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate memfs runtime configuration.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::namespace::validate_filename;
use crate::store::LengthPolicy;

/// Name of the single file when none is configured.
pub const DEFAULT_FILENAME: &str = "00000001";
/// Capacity of the in-memory file (10 MiB).
pub const DEFAULT_CAPACITY: usize = 10 * 1024 * 1024;
/// Default attribute and entry cache validity.
pub const DEFAULT_ATTR_TTL: Duration = Duration::from_secs(1);
/// Filesystem name shown in the host mount table.
pub const DEFAULT_FS_NAME: &str = "memfs";
/// Upper bound accepted for `cache.attr_ttl_ms`.
pub const MAX_ATTR_TTL_MS: u64 = 3_600_000;
/// Environment variable naming a config file when `--config` is absent.
pub const CONFIG_ENV: &str = "MEMFS_CONFIG";

/// Runtime configuration for one memfs mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemfsConfig {
    /// Name of the single file in the root directory.
    pub filename: String,
    /// Fixed buffer capacity in bytes.
    pub capacity: usize,
    /// How the occupied length is derived.
    pub length_policy: LengthPolicy,
    /// Attribute and entry cache validity.
    pub attr_ttl: Duration,
    /// Mount-time options.
    pub mount: MountConfig,
    /// Connection parameters negotiated with the kernel at init.
    pub conn: Vec<ConnOption>,
}

impl Default for MemfsConfig {
    fn default() -> Self {
        Self {
            filename: DEFAULT_FILENAME.to_owned(),
            capacity: DEFAULT_CAPACITY,
            length_policy: LengthPolicy::default(),
            attr_ttl: DEFAULT_ATTR_TTL,
            mount: MountConfig::default(),
            conn: Vec::new(),
        }
    }
}

/// Options handed to the transport when mounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Filesystem name (`fsname=`).
    pub fs_name: String,
    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,
    /// Let users other than the mounter access the file.
    pub allow_other: bool,
    /// Additional options, from `mount.options` and `-o`.
    pub flags: Vec<MountFlag>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: DEFAULT_FS_NAME.to_owned(),
            auto_unmount: true,
            allow_other: false,
            flags: Vec::new(),
        }
    }
}

impl MemfsConfig {
    /// Check every field, naming the offending key on failure.
    pub fn validate(&self) -> Result<()> {
        validate_filename(&self.filename).context("file.name")?;
        if self.capacity == 0 {
            return Err(anyhow!("file.capacity must be >= 1"));
        }
        if self.attr_ttl > Duration::from_millis(MAX_ATTR_TTL_MS) {
            return Err(anyhow!("cache.attr_ttl_ms must be <= {MAX_ATTR_TTL_MS}"));
        }
        if self.mount.fs_name.trim().is_empty() {
            return Err(anyhow!("mount.fs_name must not be empty"));
        }
        if self.mount.fs_name.contains(',') {
            return Err(anyhow!("mount.fs_name must not contain ','"));
        }
        Ok(())
    }

    /// Merge parsed `-o` options into the mount and connection lists.
    pub fn apply_options(&mut self, options: ParsedOptions) {
        self.mount.flags.extend(options.flags);
        self.conn.extend(options.conn);
    }

    /// Full, de-duplicated mount option list.
    #[must_use]
    pub fn mount_flags(&self) -> Vec<MountFlag> {
        let mut flags = vec![MountFlag::FsName(self.mount.fs_name.clone())];
        if self.mount.auto_unmount {
            flags.push(MountFlag::AutoUnmount);
        }
        if self.mount.allow_other {
            flags.push(MountFlag::AllowOther);
        }
        for flag in &self.mount.flags {
            if matches!(flag, MountFlag::FsName(_)) {
                flags.retain(|existing| !matches!(existing, MountFlag::FsName(_)));
            }
            if !flags.contains(flag) {
                flags.push(flag.clone());
            }
        }
        flags
    }
}

/// A single mount option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountFlag {
    /// `fsname=NAME`.
    FsName(String),
    /// `subtype=NAME`.
    Subtype(String),
    /// `allow_other`.
    AllowOther,
    /// `allow_root`.
    AllowRoot,
    /// `auto_unmount`.
    AutoUnmount,
    /// `default_permissions`.
    DefaultPermissions,
    /// `ro`.
    ReadOnly,
    /// `rw`.
    ReadWrite,
    /// `atime`.
    Atime,
    /// `noatime`.
    NoAtime,
    /// `exec`.
    Exec,
    /// `noexec`.
    NoExec,
    /// `suid`.
    Suid,
    /// `nosuid`.
    NoSuid,
    /// `dev`.
    Dev,
    /// `nodev`.
    NoDev,
    /// `sync`.
    Sync,
    /// `async`.
    Async,
    /// `dirsync`.
    DirSync,
    /// Anything else, passed through verbatim.
    Custom(String),
}

impl FromStr for MountFlag {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("empty mount option"));
        }
        if let Some(name) = value.strip_prefix("fsname=") {
            return Ok(Self::FsName(name.to_owned()));
        }
        if let Some(name) = value.strip_prefix("subtype=") {
            return Ok(Self::Subtype(name.to_owned()));
        }
        Ok(match value {
            "allow_other" => Self::AllowOther,
            "allow_root" => Self::AllowRoot,
            "auto_unmount" => Self::AutoUnmount,
            "default_permissions" => Self::DefaultPermissions,
            "ro" => Self::ReadOnly,
            "rw" => Self::ReadWrite,
            "atime" => Self::Atime,
            "noatime" => Self::NoAtime,
            "exec" => Self::Exec,
            "noexec" => Self::NoExec,
            "suid" => Self::Suid,
            "nosuid" => Self::NoSuid,
            "dev" => Self::Dev,
            "nodev" => Self::NoDev,
            "sync" => Self::Sync,
            "async" => Self::Async,
            "dirsync" => Self::DirSync,
            other => Self::Custom(other.to_owned()),
        })
    }
}

/// Connection parameter applied when the kernel session is initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnOption {
    /// `max_write=N`.
    MaxWrite(u32),
    /// `max_readahead=N`.
    MaxReadahead(u32),
    /// `max_background=N`.
    MaxBackground(u16),
    /// `congestion_threshold=N`.
    CongestionThreshold(u16),
    /// `writeback_cache`.
    WritebackCache,
}

impl ConnOption {
    /// Recognise a connection parameter; `None` means it is a mount option.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        let value = value.trim();
        if value == "writeback_cache" {
            return Ok(Some(Self::WritebackCache));
        }
        let Some((key, raw)) = value.split_once('=') else {
            return Ok(None);
        };
        let option = match key {
            "max_write" => {
                let size: u32 = parse_number(key, raw)?;
                if size == 0 {
                    return Err(anyhow!("max_write must be >= 1"));
                }
                Self::MaxWrite(size)
            }
            "max_readahead" => Self::MaxReadahead(parse_number(key, raw)?),
            "max_background" => Self::MaxBackground(parse_number(key, raw)?),
            "congestion_threshold" => Self::CongestionThreshold(parse_number(key, raw)?),
            _ => return Ok(None),
        };
        Ok(Some(option))
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} expects an unsigned integer, got {raw:?}"))
}

/// A `-o` argument split into mount flags and connection parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    /// Options handed to the mount call.
    pub flags: Vec<MountFlag>,
    /// Options applied to the kernel connection at init.
    pub conn: Vec<ConnOption>,
}

impl ParsedOptions {
    /// Append the options parsed from another argument.
    pub fn extend(&mut self, other: ParsedOptions) {
        self.flags.extend(other.flags);
        self.conn.extend(other.conn);
    }
}

/// Parse a comma separated `-o` argument.
pub fn parse_mount_options(spec: &str) -> Result<ParsedOptions> {
    let mut parsed = ParsedOptions::default();
    for item in spec.split(',').filter(|item| !item.trim().is_empty()) {
        let context = || format!("invalid mount option in {spec:?}");
        match ConnOption::parse(item).with_context(context)? {
            Some(option) => parsed.conn.push(option),
            None => parsed.flags.push(item.parse::<MountFlag>().with_context(context)?),
        }
    }
    Ok(parsed)
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    #[serde(default)]
    file: FileTomlSection,
    #[serde(default)]
    mount: MountTomlSection,
    #[serde(default)]
    cache: CacheTomlSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileTomlSection {
    name: Option<String>,
    capacity: Option<usize>,
    length_policy: Option<LengthPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct MountTomlSection {
    fs_name: Option<String>,
    auto_unmount: Option<bool>,
    allow_other: Option<bool>,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheTomlSection {
    attr_ttl_ms: Option<u64>,
}

/// Parse a TOML document over the defaults and validate the result.
pub fn parse_config(text: &str) -> Result<MemfsConfig> {
    let parsed: ConfigToml = toml::from_str(text).context("invalid memfs config TOML")?;
    let mut config = MemfsConfig::default();
    if let Some(name) = parsed.file.name {
        config.filename = name;
    }
    if let Some(capacity) = parsed.file.capacity {
        config.capacity = capacity;
    }
    if let Some(policy) = parsed.file.length_policy {
        config.length_policy = policy;
    }
    if let Some(fs_name) = parsed.mount.fs_name {
        config.mount.fs_name = fs_name;
    }
    if let Some(auto_unmount) = parsed.mount.auto_unmount {
        config.mount.auto_unmount = auto_unmount;
    }
    if let Some(allow_other) = parsed.mount.allow_other {
        config.mount.allow_other = allow_other;
    }
    for option in &parsed.mount.options {
        config.apply_options(parse_mount_options(option)?);
    }
    if let Some(ttl_ms) = parsed.cache.attr_ttl_ms {
        config.attr_ttl = Duration::from_millis(ttl_ms);
    }
    config.validate()?;
    Ok(config)
}

/// Load and validate a config file from disk.
pub fn load_config(path: &Path) -> Result<MemfsConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read memfs config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("in memfs config {}", path.display()))
}

/// Config path from [`CONFIG_ENV`], if set and non-empty.
#[must_use]
pub fn config_path_from_env() -> Option<PathBuf> {
    let value = std::env::var(CONFIG_ENV).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}
