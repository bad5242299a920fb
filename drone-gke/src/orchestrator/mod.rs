//! Deployment pipeline
//!
//! A run is a fixed list of [`Stage`]s executed in order against one
//! [`CommandRunner`]. The first failing stage ends the run; nothing already
//! done is undone.

pub mod apply;
pub mod rollout;
mod stages;

pub use apply::apply_command;
pub use rollout::{RolloutTarget, rollout_command};

use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::project::resolve_project;
use crate::runner::CommandRunner;
use crate::template::{RenderedManifest, TemplateData, render};
use std::fmt;
use std::io::Write;

pub const GCLOUD: &str = "gcloud";

/// Exit status of coreutils `timeout` when the wrapped command ran too long.
pub const TIMEOUT_EXPIRED: i32 = 124;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    FetchCredentials,
    CheckToolVersion,
    EnsureNamespace,
    Validate,
    Apply,
    WaitRollout,
}

/// Everything a stage may read. Stages never mutate it.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a DeploymentConfig,
    pub project: &'a str,
    pub manifest: &'a RenderedManifest,
}

pub type StageFn = fn(&StageContext<'_>, &mut dyn CommandRunner) -> Result<()>;

impl Stage {
    /// Execution order. Rendering happens before the first stage.
    pub const PIPELINE: [Stage; 7] = [
        Stage::Authenticate,
        Stage::FetchCredentials,
        Stage::CheckToolVersion,
        Stage::EnsureNamespace,
        Stage::Validate,
        Stage::Apply,
        Stage::WaitRollout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Authenticate => "authenticate",
            Stage::FetchCredentials => "fetch-credentials",
            Stage::CheckToolVersion => "check-tool-version",
            Stage::EnsureNamespace => "ensure-namespace",
            Stage::Validate => "validate",
            Stage::Apply => "apply",
            Stage::WaitRollout => "wait-rollout",
        }
    }

    fn function(self) -> StageFn {
        match self {
            Stage::Authenticate => stages::authenticate,
            Stage::FetchCredentials => stages::fetch_credentials,
            Stage::CheckToolVersion => stages::check_tool_version,
            Stage::EnsureNamespace => stages::ensure_namespace,
            Stage::Validate => stages::validate,
            Stage::Apply => stages::apply,
            Stage::WaitRollout => rollout::wait_for_rollouts,
        }
    }

    pub fn run(self, context: &StageContext<'_>, runner: &mut dyn CommandRunner) -> Result<()> {
        (self.function())(context, runner)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.name())
    }
}

/// Run every stage in [`Stage::PIPELINE`] order, stopping at the first error.
pub fn run_pipeline(context: &StageContext<'_>, runner: &mut dyn CommandRunner) -> Result<()> {
    for stage in Stage::PIPELINE {
        tracing::debug!("entering {stage}");
        if let Err(err) = stage.run(context, runner) {
            tracing::debug!("{stage} failed, aborting run");
            return Err(err);
        }
    }
    Ok(())
}

/// Resolve the project, render `template` and run the pipeline.
///
/// Rendering completes before any command is issued, so template errors
/// never reach the cluster.
pub fn deploy(
    config: &DeploymentConfig,
    template: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    let project = resolve_project(config.project.as_deref(), &config.credentials_path)?;

    let data = TemplateData::new(config, &project, lookup)?;
    if config.verbose {
        print_verbose(|out| data.dump(out));
    }

    let manifest = render(&config.template_path, template, &data)?;
    if config.verbose {
        print_verbose(|out| {
            writeln!(out, "---- BEGIN GENERATED KUBERNETES MANIFEST ----")?;
            writeln!(out, "{manifest}")?;
            writeln!(out, "---- END GENERATED KUBERNETES MANIFEST ----")
        });
    }

    let context = StageContext {
        config,
        project: &project,
        manifest: &manifest,
    };
    run_pipeline(&context, runner)
}

fn print_verbose(write: impl FnOnce(&mut dyn Write) -> std::io::Result<()>) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = write(&mut out) {
        tracing::warn!("could not write verbose output: {err}");
    }
}

/// `parts` as owned arguments.
pub(crate) fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}
