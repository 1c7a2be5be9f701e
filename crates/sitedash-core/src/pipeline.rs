//! The site build pipeline.
//!
//! Steps, in order, each aborting the rest on failure:
//! 1. clone the website repository, or pull if the checkout exists
//! 2. install dependencies
//! 3. run the optional pre-processing script
//! 4. copy staged content into the checkout
//! 5. run the build command
//! 6. verify the output directory exists
//! 7. copy the output into `builds/<id>/`
//!
//! `execute_build` wraps the pipeline with the record bookkeeping: the record
//! ends `inactive` on success and `error` on any failure, and old artifacts
//! are pruned after a success.

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::build::BuildStatus;
use crate::config::DashboardConfig;
use crate::db::BuildDb;
use crate::error::{DashError, Result};
use crate::io;
use crate::retention::prune_artifacts;
use crate::runner::{CommandRunner, Invocation};

pub struct BuildPipeline<'a> {
    config: &'a DashboardConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(config: &'a DashboardConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    fn command(&self, argv: &[String], what: &str) -> Result<Invocation> {
        let inv = Invocation::from_argv(argv, &self.config.checkout_dir())
            .ok_or_else(|| DashError::Config(format!("{what} is empty")))?;
        Ok(inv.envs(&self.config.command_env()))
    }

    /// Clone the repository if there is no checkout yet, otherwise pull.
    pub fn checkout(&self) -> Result<()> {
        let checkout = self.config.checkout_dir();
        let env = self.config.command_env();
        if checkout.exists() {
            info!("updating checkout in {}", checkout.display());
            self.runner
                .run_checked(&Invocation::new("git", &checkout).arg("pull").envs(&env))
        } else {
            if self.config.repo_url.trim().is_empty() {
                return Err(DashError::Config("repo_url is not set".into()));
            }
            io::ensure_dir(&self.config.work_dir)?;
            info!("cloning {}", self.config.repo_url);
            self.runner.run_checked(
                &Invocation::new("git", &self.config.work_dir)
                    .args(["clone", self.config.repo_url.as_str(), "repo"])
                    .envs(&env),
            )
        }
    }

    /// Run every step for `build_id` and return the artifact directory.
    pub fn run(&self, build_id: u64) -> Result<PathBuf> {
        self.checkout()?;

        if !self.config.install_command.is_empty() {
            self.runner
                .run_checked(&self.command(&self.config.install_command, "install_command")?)?;
        }

        if let Some(script) = &self.config.prebuild_script {
            self.runner
                .run_checked(&self.command(script, "prebuild_script")?)?;
        }

        self.stage_content()?;

        self.runner
            .run_checked(&self.command(&self.config.build_command, "build_command")?)?;

        let output = self.config.checkout_dir().join(&self.config.output_dir);
        if !output.is_dir() {
            return Err(DashError::MissingOutput(output.display().to_string()));
        }

        let artifact = self.config.artifact_dir(build_id);
        io::remove_dir_if_exists(&artifact)?;
        io::copy_dir_all(&output, &artifact)?;
        Ok(artifact)
    }

    fn stage_content(&self) -> Result<()> {
        let Some(content) = &self.config.content_dir else {
            return Ok(());
        };
        if !content.is_dir() {
            warn!("content_dir {} does not exist, skipping", content.display());
            return Ok(());
        }
        let target = self.config.checkout_dir().join(&self.config.content_target);
        info!("copying {} into {}", content.display(), target.display());
        io::copy_dir_all(content, &target)
    }
}

/// Run the pipeline for an existing `working` record and finalize it.
///
/// Pipeline failures are logged and reflected only in the record's status;
/// the returned error covers store failures alone.
pub fn execute_build(
    db: &BuildDb,
    config: &DashboardConfig,
    runner: &dyn CommandRunner,
    build_id: u64,
) -> Result<BuildStatus> {
    info!(build_id, "build started");
    match BuildPipeline::new(config, runner).run(build_id) {
        Ok(artifact) => {
            db.set_status(build_id, BuildStatus::Inactive)?;
            info!(build_id, artifact = %artifact.display(), "build finished");
            if let Err(e) = prune_artifacts(&config.builds_dir(), config.retention) {
                warn!(build_id, error = %e, "artifact pruning failed");
            }
            Ok(BuildStatus::Inactive)
        }
        Err(e) => {
            error!(build_id, error = %e, "build failed");
            db.set_status(build_id, BuildStatus::Error)?;
            Ok(BuildStatus::Error)
        }
    }
}
