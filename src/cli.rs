use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Rewrites insecure webhook callback URLs across a GitHub organization
#[derive(Debug, Parser)]
#[command(name = "webhook-patcher", version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, env = "WEBHOOK_PATCHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Organization to scan, overriding the config file
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Maximum number of API requests in flight, overriding the config file
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Read only the first page of every listing
    #[arg(long, global = true)]
    pub single_page: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Commands {
    /// Patch every hook that points at an insecure URL
    Patch,
    /// Report which hooks would be patched without changing anything
    Scan,
    /// Check that the configured credentials are accepted by the API
    Check,
    /// Print the version and exit
    Version,
}

impl Cli {
    /// Apply flags that override config file values.
    ///
    /// The caller must run [`Config::validate`] afterwards.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(org) = &self.org {
            config.org.clone_from(org);
        }
        if let Some(max) = self.max_concurrency {
            config.max_concurrency = max;
        }
        if self.single_page {
            config.paginate = false;
        }
    }
}
