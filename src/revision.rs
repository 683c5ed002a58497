//! Revision identifiers and working-tree checkout
//!
//! Checking out a revision mutates the primary tree in place and re-syncs its
//! nested submodules to the state recorded at that revision. Only one
//! revision may be prepared at a time.

use crate::executor::{CommandRunner, Invocation};
use crate::stage::{StageFailure, StageOutcome};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Opaque name of a point in source history (usually a full commit hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Revision {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Capability to put the primary tree at a given revision
pub trait RevisionController {
    fn checkout(&self, revision: &Revision) -> StageOutcome;
}

/// Checks out revisions with the git CLI
#[derive(Debug, Clone)]
pub struct GitRevisionController<R> {
    runner: R,
    tree: PathBuf,
    timeout: Duration,
}

impl<R: CommandRunner> GitRevisionController<R> {
    pub fn new(runner: R, tree: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            tree: tree.into(),
            timeout,
        }
    }

    fn git<I, S>(&self, args: I, revision: &Revision, stage: &str) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("git", &self.tree)
            .args(args)
            .timeout(self.timeout)
            .label(revision.as_str(), stage)
    }
}

impl<R: CommandRunner> RevisionController for GitRevisionController<R> {
    fn checkout(&self, revision: &Revision) -> StageOutcome {
        info!("Checking out commit: {}", revision);
        let checkout = self.runner.run(&self.git(
            ["checkout", "--quiet", revision.as_str()],
            revision,
            "checkout",
        ));
        if !checkout.success() {
            return Err(StageFailure::Checkout {
                reason: checkout.failure_reason(),
            });
        }

        info!("Syncing submodules for {}", revision.short());
        let sync = self.runner.run(&self.git(
            ["submodule", "update", "--init", "--recursive"],
            revision,
            "submodule_sync",
        ));
        if !sync.success() {
            return Err(StageFailure::SubmoduleSync {
                reason: sync.failure_reason(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandStatus;
    use crate::test_support::{completed, output, ScriptedRunner};

    #[test]
    fn test_revision_short() {
        let rev = Revision::new("0123456789abcdef0123");
        assert_eq!(rev.short(), "0123456789ab");
        assert_eq!(Revision::new("abc").short(), "abc");
    }

    #[test]
    fn test_checkout_then_submodule_sync() {
        let runner = ScriptedRunner::succeeding();
        let controller = GitRevisionController::new(&runner, "/src/slang", Duration::from_secs(60));

        assert!(controller.checkout(&Revision::new("abc123")).is_ok());

        let calls = runner.calls();
        assert_eq!(
            runner.command_lines(),
            vec![
                "git checkout --quiet abc123",
                "git submodule update --init --recursive",
            ]
        );
        assert!(calls.iter().all(|c| c.cwd == PathBuf::from("/src/slang")));
        assert_eq!(calls[1].label.as_ref().unwrap().stage, "submodule_sync");
    }

    #[test]
    fn test_checkout_failure_skips_submodule_sync() {
        let runner = ScriptedRunner::new(|_| output(CommandStatus::NonZeroExit(128), ""));
        let controller = GitRevisionController::new(&runner, "/src/slang", Duration::from_secs(60));

        let result = controller.checkout(&Revision::new("deadbeef"));

        match result {
            Err(StageFailure::Checkout { reason }) => assert!(reason.contains("nonzero-exit")),
            other => panic!("Expected checkout failure, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_submodule_sync_failure() {
        let runner = ScriptedRunner::new(|inv| {
            if inv.args[0] == "submodule" {
                output(CommandStatus::TimedOut, "")
            } else {
                completed("")
            }
        });
        let controller = GitRevisionController::new(&runner, "/src/slang", Duration::from_secs(60));

        let result = controller.checkout(&Revision::new("abc123"));
        assert_eq!(
            result,
            Err(StageFailure::SubmoduleSync {
                reason: "timeout".to_string()
            })
        );
    }
}
