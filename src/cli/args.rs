//! CLI argument definitions
//!
//! Global CLI options and configuration merging logic.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crashreport::CrashLogStore;
use crashreport::consts::{DEFAULT_COLLECTOR_URL, DEFAULT_KEEP_AGE};

use crate::config::Config;

use super::commands::Commands;

#[derive(Parser)]
#[command(name = "crashreport")]
#[command(about = "Inspect and deliver pending crash reports", version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Crash log folder (default: <local data dir>/<package>/crashes)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub(crate) dir: Option<PathBuf>,

    /// Read this config file instead of the default locations
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Collector identifier of the application
    #[arg(short, long, global = true)]
    pub(crate) identifier: Option<String>,

    /// Collector base URL
    #[arg(long, global = true, value_name = "URL")]
    pub(crate) collector_url: Option<String>,

    /// Package name used for the default folder and record headers
    #[arg(short, long, global = true)]
    pub(crate) package: Option<String>,

    /// Output as JSON
    #[arg(short, long, global = true)]
    pub(crate) json: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub(crate) debug: bool,

    /// Hours a pending record is kept before it is discarded
    #[arg(skip)]
    pub(crate) keep_age_hours: Option<u64>,

    #[arg(skip)]
    pub(crate) ask_before_sending: Option<bool>,

    #[arg(skip)]
    pub(crate) user_id: Option<String>,
}

impl Cli {
    /// Merge config file values into CLI (CLI args take precedence)
    pub(crate) fn with_config(mut self, config: Config) -> Self {
        if !self.debug && config.debug {
            self.debug = true;
        }
        if self.dir.is_none() {
            self.dir = config.storage_dir;
        }
        if self.identifier.is_none() {
            self.identifier = config.identifier;
        }
        if self.collector_url.is_none() {
            self.collector_url = config.collector_url;
        }
        if self.package.is_none() {
            self.package = config.package_name;
        }
        self.keep_age_hours = config.keep_age_hours;
        self.ask_before_sending = config.ask_before_sending;
        self.user_id = config.user_id;
        self
    }

    pub(crate) fn package_name(&self) -> &str {
        self.package.as_deref().unwrap_or(env!("CARGO_PKG_NAME"))
    }

    pub(crate) fn storage_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| CrashLogStore::default_dir(self.package_name()))
    }

    pub(crate) fn collector_url(&self) -> &str {
        self.collector_url.as_deref().unwrap_or(DEFAULT_COLLECTOR_URL)
    }

    pub(crate) fn keep_age(&self) -> Duration {
        self.keep_age_hours
            .map(|h| Duration::from_secs(h.saturating_mul(3600)))
            .unwrap_or(DEFAULT_KEEP_AGE)
    }
}
