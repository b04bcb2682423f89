// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the memfs FUSE daemon.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for memfs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{debug, info};
use memfs::config::{config_path_from_env, load_config, parse_mount_options};
use memfs::{mount, LengthPolicy, MemFs, MemfsConfig};

#[derive(Debug, Parser)]
#[command(
    author = "Lukas Bower",
    version,
    about = "Expose one in-memory file through FUSE",
    after_help = "Example: memfs --filename=testfile /mnt/tmp"
)]
struct Cli {
    /// Name of the file exposed in the mount root.
    #[arg(long, value_name = "NAME")]
    filename: Option<String>,

    /// Path to a memfs TOML config (default: $MEMFS_CONFIG).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// How the visible file length is derived from the buffer.
    #[arg(long, value_enum)]
    length_policy: Option<LengthPolicyArg>,

    /// Allow other users to access the mount.
    #[arg(long, default_value_t = false)]
    allow_other: bool,

    /// Stay in the foreground (memfs never daemonizes; accepted for compatibility).
    #[arg(short = 'f', long, default_value_t = false)]
    foreground: bool,

    /// Log every request at debug level.
    #[arg(short = 'd', long, default_value_t = false)]
    debug: bool,

    /// Serve requests on one thread (the FUSE session loop already does).
    #[arg(short = 's', long, default_value_t = false)]
    single_thread: bool,

    /// Comma separated mount options (repeatable).
    #[arg(short = 'o', value_name = "OPTS", action = ArgAction::Append)]
    options: Vec<String>,

    /// Directory to mount on.
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LengthPolicyArg {
    /// Length is the furthest byte written.
    HighWater,
    /// Length ends at the first zero byte.
    NulTerminated,
}

impl From<LengthPolicyArg> for LengthPolicy {
    fn from(value: LengthPolicyArg) -> Self {
        match value {
            LengthPolicyArg::HighWater => LengthPolicy::HighWater,
            LengthPolicyArg::NulTerminated => LengthPolicy::NulTerminated,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = log_filter(&cli);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
    debug!(
        "foreground={} single_thread={}",
        cli.foreground, cli.single_thread
    );
    let config = resolve_config(&cli)?;
    let fs = MemFs::from_config(&config).context("failed to initialise memfs")?;
    info!(
        "serving {:?} ({} bytes) at {}",
        config.filename,
        config.capacity,
        cli.mountpoint.display()
    );
    mount::mount(fs, &config, &cli.mountpoint)
}

fn log_filter(cli: &Cli) -> &'static str {
    if cli.debug {
        "debug"
    } else {
        "info"
    }
}

fn resolve_config(cli: &Cli) -> Result<MemfsConfig> {
    let mut config = match cli.config.clone().or_else(config_path_from_env) {
        Some(path) => load_config(&path)?,
        None => MemfsConfig::default(),
    };
    if let Some(filename) = &cli.filename {
        config.filename = filename.clone();
    }
    if let Some(policy) = cli.length_policy {
        config.length_policy = policy.into();
    }
    if cli.allow_other {
        config.mount.allow_other = true;
    }
    for spec in &cli.options {
        config.apply_options(parse_mount_options(spec)?);
    }
    config.validate()?;
    Ok(config)
}
