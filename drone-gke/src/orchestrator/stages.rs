//! Stage bodies, one function per [`Stage`]

use super::{GCLOUD, Stage, StageContext, apply_command, to_args};
use crate::error::{ExternalCommandSnafu, Result};
use crate::namespace::namespace_manifest;
use crate::runner::{CapturedOutput, CommandRunner};
use snafu::ResultExt;

/// Activate the service account key with gcloud.
pub(super) fn authenticate(ctx: &StageContext<'_>, runner: &mut dyn CommandRunner) -> Result<()> {
    let mut args = to_args(&["auth", "activate-service-account", "--key-file"]);
    args.push(ctx.config.credentials_path.to_string_lossy().into_owned());

    runner.run(GCLOUD, &args).context(ExternalCommandSnafu {
        stage: Stage::Authenticate,
    })
}

/// Write kubeconfig credentials for the cluster.
pub(super) fn fetch_credentials(
    ctx: &StageContext<'_>,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    let location = &ctx.config.location;
    let args = to_args(&[
        "container",
        "clusters",
        "get-credentials",
        ctx.config.cluster_name.as_str(),
        "--project",
        ctx.project,
        location.flag(),
        location.value(),
    ]);

    runner.run(GCLOUD, &args).context(ExternalCommandSnafu {
        stage: Stage::FetchCredentials,
    })
}

pub(super) fn check_tool_version(
    ctx: &StageContext<'_>,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    runner
        .run(&ctx.config.kubectl(), &to_args(&["version"]))
        .context(ExternalCommandSnafu {
            stage: Stage::CheckToolVersion,
        })
}

/// Point the current context at the namespace and make sure it exists.
///
/// Uses `apply` rather than `create` so an existing namespace is not an error.
pub(super) fn ensure_namespace(
    ctx: &StageContext<'_>,
    runner: &mut dyn CommandRunner,
) -> Result<()> {
    let Some(namespace) = ctx.config.sanitized_namespace() else {
        return Ok(());
    };
    let kubectl = ctx.config.kubectl();
    let stage = Stage::EnsureNamespace;

    println!("Configuring kubectl to the {namespace} namespace");
    let context = ctx.config.context_name(ctx.project);
    runner
        .run(
            &kubectl,
            &to_args(&[
                "config",
                "set-context",
                context.as_str(),
                "--namespace",
                namespace.as_str(),
            ]),
        )
        .context(ExternalCommandSnafu { stage })?;

    println!("Ensuring the {namespace} namespace exists");
    let (program, args) = apply_command(ctx.config, ctx.config.dry_run);
    runner
        .run_with_input(&namespace_manifest(&namespace), &program, &args)
        .context(ExternalCommandSnafu { stage })
}

/// Dry-run apply of the manifest ahead of the real one. Skipped on dry runs,
/// where the apply stage already is the dry run.
pub(super) fn validate(ctx: &StageContext<'_>, runner: &mut dyn CommandRunner) -> Result<()> {
    if ctx.config.dry_run {
        tracing::debug!("dry run: validation happens in the apply stage");
        return Ok(());
    }

    println!("Validating Kubernetes manifests with a dry-run");
    let (program, args) = apply_command(ctx.config, true);
    if let Err(err) = runner.run_with_input(ctx.manifest.as_str(), &program, &args) {
        surface_diagnostics(runner.captured());
        return Err(err).context(ExternalCommandSnafu {
            stage: Stage::Validate,
        });
    }

    Ok(())
}

pub(super) fn apply(ctx: &StageContext<'_>, runner: &mut dyn CommandRunner) -> Result<()> {
    if ctx.config.dry_run {
        println!("Validating Kubernetes manifests with a dry-run");
    } else {
        println!("Applying Kubernetes manifest to the cluster");
    }

    let (program, args) = apply_command(ctx.config, ctx.config.dry_run);
    runner
        .run_with_input(ctx.manifest.as_str(), &program, &args)
        .context(ExternalCommandSnafu {
            stage: Stage::Apply,
        })
}

/// The runner has already shown kubectl's output as it ran; only point at it.
fn surface_diagnostics(output: &CapturedOutput) {
    if output.is_empty() {
        return;
    }
    println!("The dry-run rejected the manifest, kubectl's output is shown above");
}
