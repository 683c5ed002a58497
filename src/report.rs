//! Bisect summary rendering
//!
//! Rendering is pure; only [`write_summary`] touches the filesystem, and it
//! is called once at the end of a run.

use crate::bisect::{BisectReport, SearchOutcome};
use crate::evaluator::EvaluationResult;
use crate::revision::Revision;
use crate::stage::Project;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Machine-readable summary
#[derive(Debug, Serialize)]
pub struct SummaryDocument<'a> {
    pub good: &'a Revision,
    pub bad: &'a Revision,
    pub converged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_bad: Option<&'a Revision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub evaluations: &'a [EvaluationResult],
}

impl<'a> SummaryDocument<'a> {
    pub fn new(report: &'a BisectReport) -> Self {
        Self {
            good: &report.good,
            bad: &report.bad,
            converged: report.first_bad().is_some(),
            first_bad: report.first_bad(),
            error: report.error().map(ToString::to_string),
            evaluations: &report.evaluations,
        }
    }
}

/// Paths written by [`write_summary`]
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryFiles {
    pub text: PathBuf,
    pub json: PathBuf,
}

fn render_evaluation(result: &EvaluationResult, out: &mut String) {
    out.push_str(&format!("\nCommit: {}\n", result.revision()));
    out.push_str(&format!("Checkout: {}\n", result.checkout().glyph()));
    out.push_str(&format!(
        "Primary Build: {}\n",
        result.build(Project::Primary).glyph()
    ));
    out.push_str(&format!(
        "Dependency Build: {}\n",
        result.build(Project::Dependency).glyph()
    ));
    out.push_str(&format!("Perf Test: {}\n", result.benchmark().glyph()));
    if let Some(seconds) = result.render_time() {
        out.push_str(&format!("Render time: {}s\n", seconds));
    }
    if let Some(failure) = result.failure() {
        out.push_str(&format!("Failure: {}\n", failure));
    }
    out.push_str(&format!("Status: {}\n", result.verdict()));
}

/// Human-readable summary, one block per probed revision in probe order
pub fn render_summary(report: &BisectReport) -> String {
    let mut out = format!("Bisect between {} and {}\n", report.good, report.bad);

    if report.evaluations.is_empty() {
        out.push_str("\nNo revisions were evaluated.\n");
    }
    for result in &report.evaluations {
        render_evaluation(result, &mut out);
    }

    out.push('\n');
    match &report.outcome {
        SearchOutcome::Converged { first_bad } => {
            out.push_str(&format!("First bad commit: {}\n", first_bad));
        }
        SearchOutcome::Aborted { error } => {
            out.push_str(&format!("Bisect aborted: {}\n", error));
        }
    }
    out
}

pub fn render_json(report: &BisectReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SummaryDocument::new(report))
}

/// Write `bisect_summary_<stamp>.log` and `.json` into `dir`
pub fn write_summary(dir: &Path, stamp: &str, report: &BisectReport) -> Result<SummaryFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let text = dir.join(format!("bisect_summary_{}.log", stamp));
    fs::write(&text, render_summary(report))
        .with_context(|| format!("Failed to write {}", text.display()))?;

    let json = dir.join(format!("bisect_summary_{}.json", stamp));
    let document = render_json(report).context("Failed to serialize summary")?;
    fs::write(&json, document).with_context(|| format!("Failed to write {}", json.display()))?;

    Ok(SummaryFiles { text, json })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bisect::SearchError;
    use crate::stage::StageFailure;
    use std::time::Duration;

    fn result(revision: &str, outcome: Result<f64, StageFailure>) -> EvaluationResult {
        EvaluationResult::from_outcome(Revision::new(revision), outcome, 1.0, Duration::ZERO)
    }

    fn converged_report() -> BisectReport {
        BisectReport {
            good: Revision::new("g000"),
            bad: Revision::new("b999"),
            evaluations: vec![
                result("c500", Ok(0.85)),
                result(
                    "c750",
                    Err(StageFailure::Build {
                        project: Project::Dependency,
                        reason: "nonzero-exit (code 1)".to_string(),
                    }),
                ),
                result("c800", Ok(1.25)),
            ],
            outcome: SearchOutcome::Converged {
                first_bad: Revision::new("c800"),
            },
        }
    }

    #[test]
    fn test_summary_lists_probes_in_order() {
        let summary = render_summary(&converged_report());

        assert!(summary.starts_with("Bisect between g000 and b999\n"));
        let first = summary.find("Commit: c500").unwrap();
        let second = summary.find("Commit: c750").unwrap();
        let third = summary.find("Commit: c800").unwrap();
        assert!(first < second && second < third);
        assert!(summary.ends_with("First bad commit: c800\n"));
    }

    #[test]
    fn test_summary_glyphs_for_failed_stage() {
        let summary = render_summary(&converged_report());
        let block: String = summary
            .split("\nCommit: ")
            .find(|b| b.starts_with("c750"))
            .unwrap()
            .to_string();

        assert!(block.contains("Checkout: ✓"));
        assert!(block.contains("Primary Build: ✓"));
        assert!(block.contains("Dependency Build: ✗"));
        assert!(block.contains("Perf Test: -"));
        assert!(block.contains("Failure: dependency build failed"));
        assert!(block.contains("Status: inconclusive"));
        assert!(!block.contains("Render time"));
    }

    #[test]
    fn test_summary_for_measured_revision() {
        let summary = render_summary(&converged_report());
        assert!(summary.contains("Render time: 1.25s\nStatus: bad"));
        assert!(summary.contains("Render time: 0.85s\nStatus: good"));
    }

    #[test]
    fn test_summary_for_aborted_run() {
        let report = BisectReport {
            good: Revision::new("c5"),
            bad: Revision::new("c0"),
            evaluations: Vec::new(),
            outcome: SearchOutcome::Aborted {
                error: SearchError::RevisionOrdering {
                    good: Revision::new("c5"),
                    bad: Revision::new("c0"),
                },
            },
        };

        let summary = render_summary(&report);
        assert!(summary.contains("No revisions were evaluated."));
        assert!(summary.contains("Bisect aborted: good revision c5 is not an ancestor"));
    }

    #[test]
    fn test_json_summary() {
        let json = render_json(&converged_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["converged"], true);
        assert_eq!(value["first_bad"], "c800");
        assert!(value.get("error").is_none());
        assert_eq!(value["evaluations"].as_array().unwrap().len(), 3);
        assert_eq!(value["evaluations"][2]["render_time"], 1.25);
    }

    #[test]
    fn test_write_summary_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_summary(dir.path(), "20250101_120000", &converged_report()).unwrap();

        assert!(files.text.ends_with("bisect_summary_20250101_120000.log"));
        assert!(fs::read_to_string(&files.text)
            .unwrap()
            .contains("First bad commit: c800"));
        assert!(fs::read_to_string(&files.json)
            .unwrap()
            .contains("\"first_bad\": \"c800\""));
    }
}
