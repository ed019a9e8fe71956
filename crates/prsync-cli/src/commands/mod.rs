//! Command definitions and shared helpers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use prsync_core::Config;

pub mod completions;
pub mod serve;
pub mod sync;

/// prsync - sync file snapshots into GitHub pull requests as a GitHub App.
#[derive(Debug, Parser)]
#[command(name = "prsync", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "prsync.toml")]
    pub config: PathBuf,

    /// Log filter, e.g. `info` or `prsync_core=debug`.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Suppress informational output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve the HTTP entry point.
    Serve {
        /// Address to bind, overriding `server.listen`.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Run one sync and print the pull request URL.
    Sync {
        /// Snapshot location: `gs://bucket/prefix` or `file:///path`.
        #[arg(long)]
        storage_uri: String,

        /// Repository owner.
        #[arg(long)]
        owner: String,

        /// Repository name.
        #[arg(long)]
        repo: String,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Load configuration from `path`, then apply environment overrides and
/// validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
