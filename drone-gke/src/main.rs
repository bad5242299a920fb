//! drone-gke binary
//!
//! Usage: `cat .kube.yml | drone-gke --zone us-central1-a --cluster-name demo`

use anyhow::{Context, Result};
use clap::Parser;
use drone_gke::cli::Cli;
use drone_gke::{DeploymentConfig, DuctRunner, Error, RawConfig, deploy, read_template};
use std::io::IsTerminal;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    println!(
        "Drone GKE Plugin built from {}",
        option_env!("GIT_REV").unwrap_or("[unknown]")
    );

    let config = DeploymentConfig::resolve(RawConfig::from(cli))?;
    tracing::debug!(
        "cluster {} in {}, namespace {:?}, dry run {}",
        config.cluster_name,
        config.location,
        config.namespace,
        config.dry_run
    );

    let template = read_stdin_template()?;

    let mut runner = DuctRunner::new();
    deploy(&config, &template, &lookup_env, &mut runner).context("Deployment failed")?;

    println!("Deployment finished");
    Ok(())
}

/// RUST_LOG wins; otherwise `info`, or `debug` for our own events when verbose.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info,drone_gke=debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn read_stdin_template() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(Error::MissingTemplate.into());
    }
    Ok(read_template(stdin.lock())?)
}

fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
