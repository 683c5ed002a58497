//! Bisect configuration loaded from a TOML file
//!
//! Every component receives the configuration explicitly; nothing reads
//! process-wide state, so several runs (for example in tests) can use
//! isolated trees and log directories.
//!
//! # Example perfbisect.toml
//!
//! ```toml
//! primary_tree_path = "/work/slang"
//! dependency_tree_path = "/work/sgl"
//! benchmark_path = "/work/slangpy/examples/simplified-splatting"
//! threshold_seconds = 1.0
//! metric_pattern = 'renderBlobsToTexture: (\d+\.\d+)s'
//!
//! [build]
//! jobs = 10
//! dependency_build_dir = "build/windows-vs2022"
//!
//! [benchmark]
//! command = ["python3", "main.py"]
//!
//! [search]
//! max_consecutive_inconclusive = 3
//! ```

use crate::benchmark::MetricPattern;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BisectConfig {
    /// Source tree being bisected
    pub primary_tree_path: PathBuf,

    /// Co-evolving project built against the primary tree's output
    pub dependency_tree_path: PathBuf,

    /// Directory the benchmark command runs in
    pub benchmark_path: PathBuf,

    /// Revisions whose metric is at or above this many seconds are bad
    pub threshold_seconds: f64,

    /// Regex matched against each benchmark output line; the first capture
    /// group holds the duration in seconds
    pub metric_pattern: String,

    /// Main log, per-command logs and summaries go here
    pub log_dir: PathBuf,

    /// Wall-clock limit for every external command
    pub command_timeout_secs: u64,

    pub build: BuildConfig,
    pub benchmark: BenchmarkConfig,
    pub search: SearchConfig,
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            primary_tree_path: PathBuf::from("slang"),
            dependency_tree_path: PathBuf::from("sgl"),
            benchmark_path: PathBuf::from("slangpy/examples/simplified-splatting"),
            threshold_seconds: 1.0,
            metric_pattern: r"renderBlobsToTexture: (\d+\.\d+)s".to_string(),
            log_dir: PathBuf::from("bisect_logs"),
            command_timeout_secs: 3600,
            build: BuildConfig::default(),
            benchmark: BenchmarkConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

/// `[build]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Build driver, invoked as `<program> --build <dir> --config <cfg> --parallel <jobs>`
    pub program: String,
    pub configuration: String,
    pub jobs: usize,
    /// Relative to the primary tree
    pub primary_build_dir: String,
    /// Relative to the dependency tree
    pub dependency_build_dir: String,
    pub clean_primary: bool,
    pub clean_dependency: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: "cmake".to_string(),
            configuration: "Release".to_string(),
            jobs: 10,
            primary_build_dir: "build".to_string(),
            dependency_build_dir: "build".to_string(),
            clean_primary: true,
            clean_dependency: false,
        }
    }
}

/// `[benchmark]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    /// Program and arguments
    pub command: Vec<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string(), "main.py".to_string()],
        }
    }
}

/// `[search]` table: bounds on the bisection loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Abort after this many inconclusive revisions in a row
    pub max_consecutive_inconclusive: usize,
    /// Abort after this many candidates without converging
    pub max_probes: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_consecutive_inconclusive: 3,
            max_probes: 64,
        }
    }
}

impl BisectConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load configuration from a TOML string; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.threshold_seconds.is_finite() || self.threshold_seconds <= 0.0 {
            return Err(format!(
                "threshold_seconds must be a positive number, got {}",
                self.threshold_seconds
            ));
        }

        MetricPattern::new(&self.metric_pattern).map_err(|e| e.to_string())?;

        if self.command_timeout_secs == 0 {
            return Err("command_timeout_secs must be > 0".to_string());
        }

        if self.build.jobs == 0 {
            return Err("build.jobs must be > 0".to_string());
        }

        if self.build.program.trim().is_empty() {
            return Err("build.program must not be empty".to_string());
        }

        if self.benchmark.command.is_empty() {
            return Err("benchmark.command must name a program".to_string());
        }

        if self.search.max_consecutive_inconclusive == 0 {
            return Err("search.max_consecutive_inconclusive must be >= 1".to_string());
        }

        if self.search.max_probes == 0 {
            return Err("search.max_probes must be >= 1".to_string());
        }

        Ok(())
    }
}
