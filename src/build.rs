//! Builds the primary and dependency projects at the checked-out revision

use crate::config::BisectConfig;
use crate::executor::{CommandRunner, Invocation};
use crate::revision::Revision;
use crate::stage::{Project, StageFailure, StageOutcome};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Capability to build one of the two projects
pub trait BuildStage {
    fn build(&self, project: Project, revision: &Revision) -> StageOutcome;
}

/// One project's source tree and build directory
#[derive(Debug, Clone, PartialEq)]
pub struct BuildTarget {
    pub tree: PathBuf,
    pub build_dir: String,
    pub clean_first: bool,
}

/// Drives `cmake --build` with a fixed configuration and worker count
#[derive(Debug, Clone)]
pub struct CmakeBuild<R> {
    runner: R,
    program: String,
    configuration: String,
    jobs: usize,
    timeout: Duration,
    primary: BuildTarget,
    dependency: BuildTarget,
}

impl<R: CommandRunner> CmakeBuild<R> {
    pub fn from_config(runner: R, config: &BisectConfig) -> Self {
        Self {
            runner,
            program: config.build.program.clone(),
            configuration: config.build.configuration.clone(),
            jobs: config.build.jobs,
            timeout: config.command_timeout(),
            primary: BuildTarget {
                tree: config.primary_tree_path.clone(),
                build_dir: config.build.primary_build_dir.clone(),
                clean_first: config.build.clean_primary,
            },
            dependency: BuildTarget {
                tree: config.dependency_tree_path.clone(),
                build_dir: config.build.dependency_build_dir.clone(),
                clean_first: config.build.clean_dependency,
            },
        }
    }

    fn target(&self, project: Project) -> &BuildTarget {
        match project {
            Project::Primary => &self.primary,
            Project::Dependency => &self.dependency,
        }
    }

    fn invocation(&self, project: Project, revision: &Revision) -> Invocation {
        let target = self.target(project);
        let mut invocation = Invocation::new(&self.program, &target.tree)
            .args(["--build", target.build_dir.as_str()])
            .args(["--config", self.configuration.as_str()])
            .arg("--parallel")
            .arg(self.jobs.to_string())
            .timeout(self.timeout)
            .label(revision.as_str(), format!("build_{}", project));
        if target.clean_first {
            invocation = invocation.arg("--clean-first");
        }
        invocation
    }
}

impl<R: CommandRunner> BuildStage for CmakeBuild<R> {
    fn build(&self, project: Project, revision: &Revision) -> StageOutcome {
        info!("Building {} project at {}", project, revision.short());
        let output = self.runner.run(&self.invocation(project, revision));
        if output.success() {
            info!(
                "{} build finished in {:.1}s",
                project,
                output.elapsed.as_secs_f64()
            );
            Ok(())
        } else {
            Err(StageFailure::Build {
                project,
                reason: output.failure_reason(),
            })
        }
    }
}
