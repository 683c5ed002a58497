// The version-control bisect primitive and its git implementation

use crate::executor::{CommandOutput, CommandRunner, Invocation};
use crate::revision::Revision;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Feedback for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Good,
    Bad,
    Skip,
}

impl Mark {
    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Good => "good",
            Mark::Bad => "bad",
            Mark::Skip => "skip",
        }
    }
}

/// What the primitive wants next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BisectStep {
    /// Test this revision next
    Candidate(Revision),
    /// The range collapsed to this first bad revision
    Converged(Revision),
    /// Only skipped revisions are left; the first bad one is among these
    Exhausted(Vec<Revision>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrimitiveError {
    #[error("`{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("unknown revision `{0}`")]
    UnknownRevision(String),

    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Binary search state over the revision history
///
/// Implementations own the remaining candidate range; the driver only sees
/// one [`BisectStep`] at a time.
pub trait BisectPrimitive {
    /// Full identifier for a user-supplied revision name
    fn resolve(&mut self, name: &str) -> Result<Revision, PrimitiveError>;

    fn is_ancestor(
        &mut self,
        ancestor: &Revision,
        descendant: &Revision,
    ) -> Result<bool, PrimitiveError>;

    fn start(&mut self, good: &Revision, bad: &Revision) -> Result<BisectStep, PrimitiveError>;

    fn mark(&mut self, revision: &Revision, mark: Mark) -> Result<BisectStep, PrimitiveError>;

    /// Leave bisect mode and restore the tree
    fn reset(&mut self) -> Result<(), PrimitiveError>;
}

/// `git bisect` in the primary tree
#[derive(Debug, Clone)]
pub struct GitBisect<R> {
    runner: R,
    tree: PathBuf,
    timeout: Duration,
}

impl<R: CommandRunner> GitBisect<R> {
    pub fn new(runner: R, tree: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            tree: tree.into(),
            timeout,
        }
    }

    fn git(&self, args: &[&str]) -> (Invocation, CommandOutput) {
        let invocation = Invocation::new("git", &self.tree)
            .args(args.iter().copied())
            .timeout(self.timeout);
        let output = self.runner.run(&invocation);
        debug!(
            command = %invocation.command_line(),
            "{}",
            output.combined().trim_end()
        );
        (invocation, output)
    }

    fn git_checked(&self, args: &[&str]) -> Result<CommandOutput, PrimitiveError> {
        let (invocation, output) = self.git(args);
        if output.success() {
            Ok(output)
        } else {
            Err(command_error(&invocation, &output))
        }
    }

    /// Interpret the output of `git bisect start|good|bad|skip`
    fn next_step(&self, args: &[&str]) -> Result<BisectStep, PrimitiveError> {
        let (invocation, output) = self.git(args);
        let text = output.combined();

        if let Some(first_bad) = parse_first_bad(&text) {
            return Ok(BisectStep::Converged(first_bad));
        }
        if let Some(remaining) = parse_only_skipped(&text) {
            return Ok(BisectStep::Exhausted(remaining));
        }
        if !output.success() {
            return Err(command_error(&invocation, &output));
        }

        let head = self.git_checked(&["rev-parse", "HEAD"])?;
        Ok(BisectStep::Candidate(Revision::new(head.stdout.trim())))
    }
}

impl<R: CommandRunner> BisectPrimitive for GitBisect<R> {
    fn resolve(&mut self, name: &str) -> Result<Revision, PrimitiveError> {
        let spec = format!("{}^{{commit}}", name);
        let (_, output) = self.git(&["rev-parse", "--verify", "--quiet", spec.as_str()]);
        let id = output.stdout.trim();
        if output.success() && !id.is_empty() {
            Ok(Revision::new(id))
        } else {
            Err(PrimitiveError::UnknownRevision(name.to_string()))
        }
    }

    fn is_ancestor(
        &mut self,
        ancestor: &Revision,
        descendant: &Revision,
    ) -> Result<bool, PrimitiveError> {
        let (invocation, output) = self.git(&[
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ]);
        // exit 1 means "not an ancestor"; anything else is an error
        match output.exit_code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_error(&invocation, &output)),
        }
    }

    fn start(&mut self, good: &Revision, bad: &Revision) -> Result<BisectStep, PrimitiveError> {
        self.next_step(&["bisect", "start", bad.as_str(), good.as_str()])
    }

    fn mark(&mut self, revision: &Revision, mark: Mark) -> Result<BisectStep, PrimitiveError> {
        self.next_step(&["bisect", mark.as_str(), revision.as_str()])
    }

    fn reset(&mut self) -> Result<(), PrimitiveError> {
        self.git_checked(&["bisect", "reset"]).map(|_| ())
    }
}

fn command_error(invocation: &Invocation, output: &CommandOutput) -> PrimitiveError {
    let detail = output.combined();
    let detail = detail.trim();
    PrimitiveError::Command {
        command: invocation.command_line(),
        reason: if detail.is_empty() {
            output.status.reason()
        } else {
            format!("{}: {}", output.status.reason(), detail)
        },
    }
}

fn is_commit_id(token: &str) -> bool {
    token.len() >= 7 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// `<sha> is the first bad commit`
fn parse_first_bad(text: &str) -> Option<Revision> {
    text.lines().find_map(|line| {
        let id = line.trim().strip_suffix(" is the first bad commit")?;
        is_commit_id(id).then(|| Revision::new(id))
    })
}

/// `There are only 'skip'ped commits left to test.` followed by the candidates
fn parse_only_skipped(text: &str) -> Option<Vec<Revision>> {
    if !text.contains("only 'skip'ped commits left") {
        return None;
    }
    let remaining = text
        .lines()
        .skip_while(|line| !line.contains("could be any of"))
        .skip(1)
        .map(str::trim)
        .take_while(|line| is_commit_id(line))
        .map(Revision::new)
        .collect();
    Some(remaining)
}
