//! CLI argument parsing for perfbisect

use crate::config::BisectConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "perfbisect")]
#[command(version)]
#[command(
    about = "Bisect a revision range to the first commit where a benchmark crosses a time threshold",
    long_about = None
)]
pub struct Cli {
    /// Revision known to be fast (must be an ancestor of BAD)
    #[arg(value_name = "GOOD")]
    pub good: String,

    /// Revision known to be slow
    #[arg(value_name = "BAD")]
    pub bad: String,

    /// TOML configuration file (defaults are used when omitted)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for the main log, per-command logs and summaries
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Revisions at or above this many seconds are bad
    #[arg(long = "threshold", value_name = "SECONDS")]
    pub threshold: Option<f64>,

    /// Abort after this many inconclusive revisions in a row
    #[arg(long = "max-inconclusive", value_name = "N")]
    pub max_inconclusive: Option<usize>,

    /// Per-command timeout
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Enable trace-level logging
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut BisectConfig) {
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold_seconds = threshold;
        }
        if let Some(max) = self.max_inconclusive {
            config.search.max_consecutive_inconclusive = max;
        }
        if let Some(timeout) = self.timeout {
            config.command_timeout_secs = timeout;
        }
    }
}
