//! `kubectl apply` invocation shared by the namespace, validate and apply stages

use super::to_args;
use crate::config::DeploymentConfig;

/// Program and arguments applying a manifest read from stdin.
///
/// `--record` follows `record_change_cause`; `--dry-run` follows `dry_run`,
/// which may differ from the run's own setting (validation forces it on).
pub fn apply_command(config: &DeploymentConfig, dry_run: bool) -> (String, Vec<String>) {
    let mut args = to_args(&["apply"]);

    if config.record_change_cause {
        args.push("--record".to_string());
    }

    if dry_run {
        args.push("--dry-run".to_string());
    }

    args.extend(to_args(&["-f", "-"]));

    (config.kubectl(), args)
}
