//! Waiting for rollouts to converge

use super::{Stage, StageContext, TIMEOUT_EXPIRED, to_args};
use crate::config::DeploymentConfig;
use crate::error::{ExternalCommandSnafu, Result, RolloutTimeoutSnafu};
use crate::runner::CommandRunner;
use snafu::ResultExt;
use std::fmt;

pub const TIMEOUT: &str = "timeout";

/// `kind/name` of a workload to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutTarget(String);

impl RolloutTarget {
    /// A bare name is taken to be a Deployment.
    pub fn parse(reference: &str) -> Self {
        if reference.contains('/') {
            Self(reference.to_string())
        } else {
            Self(format!("deployment/{reference}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RolloutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `kubectl rollout status` for `target`, wrapped in `timeout` when
/// `wait_seconds` is set.
pub fn rollout_command(
    config: &DeploymentConfig,
    namespace: Option<&str>,
    target: &RolloutTarget,
) -> (String, Vec<String>) {
    let mut args = to_args(&["rollout", "status", target.as_str()]);
    if let Some(namespace) = namespace {
        args.extend(to_args(&["--namespace", namespace]));
    }

    if config.wait_seconds == 0 {
        return (config.kubectl(), args);
    }

    let mut wrapped = vec![config.wait_seconds.to_string(), config.kubectl()];
    wrapped.extend(args);
    (TIMEOUT.to_string(), wrapped)
}

/// Block on each target in turn; the first failure stops the rest.
pub(super) fn wait_for_rollouts(
    ctx: &StageContext<'_>,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    let targets = &ctx.config.wait_targets;
    let namespace = ctx.config.sanitized_namespace();

    for (index, target) in targets.iter().enumerate() {
        let progress = if targets.len() > 1 {
            format!(" {}/{}", index + 1, targets.len())
        } else {
            String::new()
        };
        println!("Waiting until rollout completes for {target}{progress}");

        let (program, args) = rollout_command(ctx.config, namespace.as_deref(), target);
        if let Err(err) = runner.run(&program, &args) {
            if ctx.config.wait_seconds > 0 && err.exit_code() == Some(TIMEOUT_EXPIRED) {
                return RolloutTimeoutSnafu {
                    target: target.as_str(),
                    seconds: ctx.config.wait_seconds,
                }
                .fail();
            }
            return Err(err).context(ExternalCommandSnafu {
                stage: Stage::WaitRollout,
            });
        }
    }

    Ok(())
}
