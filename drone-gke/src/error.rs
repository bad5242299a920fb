//! Error taxonomy for a deployment run
//!
//! Every failure aborts the run. `ErrorKind` groups the concrete variants into
//! the five families callers care about.

use crate::orchestrator::Stage;
use crate::runner::CommandError;
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{reason}"))]
    ConfigValidation { reason: String },

    #[snafu(display("Error parsing vars"))]
    InvalidVars { source: serde_json::Error },

    #[snafu(display("Error parsing wait-deployments"))]
    InvalidWaitDeployments { source: serde_json::Error },

    #[snafu(display("Could not open credentials file {}", path.display()))]
    CredentialRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not unmarshal credentials file {}", path.display()))]
    CredentialParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Credentials file {} does not contain a project_id", path.display()))]
    MissingProjectId { path: PathBuf },

    #[snafu(display(
        "No manifest template found on stdin. The command is intended to work with pipes, e.g. `cat .kube.yml | drone-gke`"
    ))]
    MissingTemplate,

    #[snafu(display("Could not read manifest template from stdin"))]
    TemplateRead { source: std::io::Error },

    #[snafu(display("var {name:?} shadows existing var"))]
    VariableShadow { name: String },

    #[snafu(display("Error rendering manifest from template {template}: {reason}"))]
    TemplateRender { template: String, reason: String },

    #[snafu(display("{stage} failed"))]
    ExternalCommand { stage: Stage, source: CommandError },

    #[snafu(display("Rollout of {target} did not complete within {seconds}s"))]
    RolloutTimeout { target: String, seconds: u64 },
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigValidation,
    CredentialParse,
    TemplateRender,
    ExternalCommand,
    RolloutTimeout,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigValidation { .. }
            | Error::InvalidVars { .. }
            | Error::InvalidWaitDeployments { .. }
            | Error::MissingTemplate
            | Error::TemplateRead { .. } => ErrorKind::ConfigValidation,
            Error::CredentialRead { .. }
            | Error::CredentialParse { .. }
            | Error::MissingProjectId { .. } => ErrorKind::CredentialParse,
            Error::VariableShadow { .. } | Error::TemplateRender { .. } => {
                ErrorKind::TemplateRender
            }
            Error::ExternalCommand { .. } => ErrorKind::ExternalCommand,
            Error::RolloutTimeout { .. } => ErrorKind::RolloutTimeout,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
