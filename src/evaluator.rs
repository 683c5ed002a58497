//! Evaluate one revision: checkout, build both projects, benchmark, classify
//!
//! Stages run strictly in order and stop at the first failure. Stage failures
//! never escape: they become an [`Verdict::Inconclusive`] result that names the
//! failed stage, and the search skips that revision.

use crate::benchmark::{BenchmarkStage, MetricPatternError, ProcessBenchmark};
use crate::build::{BuildStage, CmakeBuild};
use crate::config::BisectConfig;
use crate::executor::CommandRunner;
use crate::revision::{GitRevisionController, Revision, RevisionController};
use crate::stage::{Project, Stage, StageFailure, StageOutcome, StageStatus};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Classification of an evaluated revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Metric below the threshold
    Good,
    /// Metric at or above the threshold
    Bad,
    /// No measurement; the revision must be skipped
    Inconclusive,
}

impl Verdict {
    /// Classify a measurement against the threshold (`seconds == threshold` is bad)
    pub fn classify(seconds: f64, threshold_seconds: f64) -> Self {
        if seconds >= threshold_seconds {
            Verdict::Bad
        } else {
            Verdict::Good
        }
    }

    pub fn is_definitive(self) -> bool {
        self != Verdict::Inconclusive
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one probed revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    revision: Revision,
    checkout: StageStatus,
    primary_build: StageStatus,
    dependency_build: StageStatus,
    benchmark: StageStatus,
    render_time: Option<f64>,
    verdict: Verdict,
    elapsed_secs: f64,
}

impl EvaluationResult {
    /// Build the record from the pipeline's final outcome
    ///
    /// Stages before the failed one succeeded, stages after it were never
    /// attempted.
    pub fn from_outcome(
        revision: Revision,
        outcome: StageOutcome<f64>,
        threshold_seconds: f64,
        elapsed: Duration,
    ) -> Self {
        let (render_time, failure) = match outcome {
            Ok(seconds) => (Some(seconds), None),
            Err(failure) => (None, Some(failure)),
        };
        let verdict = match render_time {
            Some(seconds) => Verdict::classify(seconds, threshold_seconds),
            None => Verdict::Inconclusive,
        };
        let status = |stage| StageStatus::for_stage(stage, failure.as_ref());

        Self {
            checkout: status(Stage::Checkout),
            primary_build: status(Stage::PrimaryBuild),
            dependency_build: status(Stage::DependencyBuild),
            benchmark: status(Stage::Benchmark),
            revision,
            render_time,
            verdict,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    pub fn checkout(&self) -> &StageStatus {
        &self.checkout
    }

    pub fn build(&self, project: Project) -> &StageStatus {
        match project {
            Project::Primary => &self.primary_build,
            Project::Dependency => &self.dependency_build,
        }
    }

    pub fn benchmark(&self) -> &StageStatus {
        &self.benchmark
    }

    pub fn render_time(&self) -> Option<f64> {
        self.render_time
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_secs_f64(self.elapsed_secs)
    }

    /// The stage failure that made this result inconclusive
    pub fn failure(&self) -> Option<&StageFailure> {
        [
            &self.checkout,
            &self.primary_build,
            &self.dependency_build,
            &self.benchmark,
        ]
        .into_iter()
        .find_map(|status| match status {
            StageStatus::Failed(failure) => Some(failure),
            _ => None,
        })
    }
}

/// Capability the bisection driver uses to test a revision
pub trait Evaluate {
    fn evaluate(&mut self, revision: &Revision) -> EvaluationResult;
}

/// Sequences checkout, both builds and the benchmark for one revision
pub struct Evaluator<C, B, M> {
    revisions: C,
    builder: B,
    benchmark: M,
    threshold_seconds: f64,
}

impl<C, B, M> Evaluator<C, B, M>
where
    C: RevisionController,
    B: BuildStage,
    M: BenchmarkStage,
{
    pub fn new(revisions: C, builder: B, benchmark: M, threshold_seconds: f64) -> Self {
        Self {
            revisions,
            builder,
            benchmark,
            threshold_seconds,
        }
    }

    pub fn threshold_seconds(&self) -> f64 {
        self.threshold_seconds
    }

    fn run_pipeline(&self, revision: &Revision) -> StageOutcome<f64> {
        self.revisions.checkout(revision)?;
        // the dependency links against the primary build's output
        self.builder.build(Project::Primary, revision)?;
        self.builder.build(Project::Dependency, revision)?;
        self.benchmark.run(revision)
    }
}

impl<R: CommandRunner + Clone>
    Evaluator<GitRevisionController<R>, CmakeBuild<R>, ProcessBenchmark<R>>
{
    /// Evaluator backed by git, cmake and the benchmark process
    pub fn from_config(runner: R, config: &BisectConfig) -> Result<Self, MetricPatternError> {
        Ok(Self::new(
            GitRevisionController::new(
                runner.clone(),
                &config.primary_tree_path,
                config.command_timeout(),
            ),
            CmakeBuild::from_config(runner.clone(), config),
            ProcessBenchmark::from_config(runner, config)?,
            config.threshold_seconds,
        ))
    }
}

impl<C, B, M> Evaluate for Evaluator<C, B, M>
where
    C: RevisionController,
    B: BuildStage,
    M: BenchmarkStage,
{
    fn evaluate(&mut self, revision: &Revision) -> EvaluationResult {
        info!("Evaluating commit {}", revision);
        let started = Instant::now();
        let outcome = self.run_pipeline(revision);
        let result = EvaluationResult::from_outcome(
            revision.clone(),
            outcome,
            self.threshold_seconds,
            started.elapsed(),
        );

        match (result.failure(), result.render_time()) {
            (Some(failure), _) => {
                warn!("Skipping commit {} due to {}", revision.short(), failure)
            }
            (None, Some(seconds)) => info!(
                "Commit {}: {}s (threshold {}s) -> {}",
                revision.short(),
                seconds,
                self.threshold_seconds,
                result.verdict()
            ),
            (None, None) => {}
        }

        result
    }
}
