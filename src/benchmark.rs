//! Benchmark stage: run the fixed scenario and extract one timing metric

use crate::config::BisectConfig;
use crate::executor::{CommandRunner, Invocation};
use crate::revision::Revision;
use crate::stage::{StageFailure, StageOutcome};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors building a [`MetricPattern`]
#[derive(Error, Debug)]
pub enum MetricPatternError {
    #[error("invalid metric_pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("metric_pattern `{0}` needs a capture group around the seconds value")]
    NoCaptureGroup(String),
}

/// Regex locating the metric line in benchmark output
///
/// The first capture group must match the duration in seconds.
#[derive(Debug, Clone)]
pub struct MetricPattern {
    regex: Regex,
}

impl MetricPattern {
    pub fn new(pattern: &str) -> Result<Self, MetricPatternError> {
        let regex = Regex::new(pattern)?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 2 {
            return Err(MetricPatternError::NoCaptureGroup(pattern.to_string()));
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Seconds from the first line that matches and parses
    ///
    /// `NaN`, infinities and negative readings are not measurements and are
    /// passed over like unparsable text.
    pub fn extract(&self, output: &str) -> Option<f64> {
        output.lines().find_map(|line| {
            let caps = self.regex.captures(line)?;
            caps.get(1)?
                .as_str()
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        })
    }
}

/// Capability to measure the checked-out and built revision
pub trait BenchmarkStage {
    /// Measured seconds, or why no measurement exists
    fn run(&self, revision: &Revision) -> StageOutcome<f64>;
}

/// Runs the benchmark as an external process and scans its output
#[derive(Debug, Clone)]
pub struct ProcessBenchmark<R> {
    runner: R,
    command: Vec<String>,
    cwd: PathBuf,
    metric: MetricPattern,
    timeout: Duration,
}

impl<R: CommandRunner> ProcessBenchmark<R> {
    pub fn new(
        runner: R,
        command: Vec<String>,
        cwd: impl Into<PathBuf>,
        metric: MetricPattern,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            command,
            cwd: cwd.into(),
            metric,
            timeout,
        }
    }

    pub fn from_config(runner: R, config: &BisectConfig) -> Result<Self, MetricPatternError> {
        Ok(Self::new(
            runner,
            config.benchmark.command.clone(),
            &config.benchmark_path,
            MetricPattern::new(&config.metric_pattern)?,
            config.command_timeout(),
        ))
    }
}

impl<R: CommandRunner> BenchmarkStage for ProcessBenchmark<R> {
    fn run(&self, revision: &Revision) -> StageOutcome<f64> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(StageFailure::BenchmarkLaunch {
                reason: "empty benchmark command".to_string(),
            });
        };

        info!("Running performance test...");
        let invocation = Invocation::new(program, &self.cwd)
            .args(args.iter().cloned())
            .timeout(self.timeout)
            .label(revision.as_str(), "perf_test");
        let output = self.runner.run(&invocation);

        if !output.success() {
            return Err(StageFailure::BenchmarkLaunch {
                reason: output.failure_reason(),
            });
        }

        match self.metric.extract(&output.combined()) {
            Some(seconds) => {
                info!("Commit {}: metric = {}s", revision.short(), seconds);
                Ok(seconds)
            }
            None => {
                warn!(
                    "Could not find metric `{}` in benchmark output",
                    self.metric.as_str()
                );
                Err(StageFailure::MetricNotFound {
                    reason: format!("no line matched `{}`", self.metric.as_str()),
                })
            }
        }
    }
}
