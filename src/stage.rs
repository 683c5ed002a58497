//! Stage outcomes and the per-stage failure taxonomy
//!
//! Every step of evaluating a revision (checkout, submodule sync, the two
//! builds, the benchmark) reports a [`StageOutcome`]. Failures never escape the
//! evaluator: they are recorded on the evaluation result and the revision is
//! skipped by the search.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The two co-evolving projects built for every probed revision
///
/// The primary project is the tree being bisected; the dependency project
/// consumes its build output, so it is always built second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Project {
    Primary,
    Dependency,
}

impl Project {
    pub fn as_str(self) -> &'static str {
        match self {
            Project::Primary => "primary",
            Project::Dependency => "dependency",
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage failed
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    #[error("checkout failed: {reason}")]
    Checkout { reason: String },

    #[error("submodule sync failed: {reason}")]
    SubmoduleSync { reason: String },

    #[error("{project} build failed: {reason}")]
    Build { project: Project, reason: String },

    #[error("benchmark failed to run: {reason}")]
    BenchmarkLaunch { reason: String },

    #[error("metric not found in benchmark output: {reason}")]
    MetricNotFound { reason: String },
}

impl StageFailure {
    /// Pipeline position of the failed stage
    ///
    /// Checkout and submodule sync both belong to the checkout stage.
    pub fn stage(&self) -> Stage {
        match self {
            StageFailure::Checkout { .. } | StageFailure::SubmoduleSync { .. } => Stage::Checkout,
            StageFailure::Build {
                project: Project::Primary,
                ..
            } => Stage::PrimaryBuild,
            StageFailure::Build {
                project: Project::Dependency,
                ..
            } => Stage::DependencyBuild,
            StageFailure::BenchmarkLaunch { .. } | StageFailure::MetricNotFound { .. } => {
                Stage::Benchmark
            }
        }
    }
}

/// Stages of the evaluation pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Checkout,
    PrimaryBuild,
    DependencyBuild,
    Benchmark,
}

/// Result of running one stage
pub type StageOutcome<T = ()> = Result<T, StageFailure>;

/// How a stage ended up on an evaluation record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum StageStatus {
    /// An earlier stage failed, so this one never ran
    NotAttempted,
    Succeeded,
    Failed(StageFailure),
}

impl StageStatus {
    /// Status of `stage` given the first failure of the pipeline, if any
    pub fn for_stage(stage: Stage, failure: Option<&StageFailure>) -> Self {
        match failure {
            None => StageStatus::Succeeded,
            Some(f) => match stage.cmp(&f.stage()) {
                std::cmp::Ordering::Less => StageStatus::Succeeded,
                std::cmp::Ordering::Equal => StageStatus::Failed(f.clone()),
                std::cmp::Ordering::Greater => StageStatus::NotAttempted,
            },
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            StageStatus::NotAttempted => '-',
            StageStatus::Succeeded => '✓',
            StageStatus::Failed(_) => '✗',
        }
    }

    pub fn is_attempted(&self) -> bool {
        !matches!(self, StageStatus::NotAttempted)
    }
}
