//! GCP project resolution

use crate::error::{CredentialParseSnafu, CredentialReadSnafu, MissingProjectIdSnafu, Result};
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};
use std::path::Path;

/// The only field read from a service account key.
#[derive(Debug, Deserialize)]
struct ServiceAccount {
    #[serde(default)]
    project_id: Option<String>,
}

/// Use `explicit` when given, otherwise the `project_id` of the service
/// account key at `credentials_path`.
pub fn resolve_project(explicit: Option<&str>, credentials_path: &Path) -> Result<String> {
    if let Some(project) = explicit.filter(|project| !project.is_empty()) {
        return Ok(project.to_string());
    }

    println!("Parsing Project ID from credentials");
    project_from_service_account(credentials_path)
}

fn project_from_service_account(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).context(CredentialReadSnafu { path })?;
    let account: ServiceAccount =
        serde_json::from_str(&content).context(CredentialParseSnafu { path })?;

    account
        .project_id
        .filter(|project| !project.is_empty())
        .context(MissingProjectIdSnafu { path })
}
