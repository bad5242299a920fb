//! Deployment configuration
//!
//! [`RawConfig`] is what the flag/env layer hands over, strings and all.
//! [`DeploymentConfig::resolve`] validates it once at startup; the result is
//! never mutated afterwards.

use crate::error::{
    ConfigValidationSnafu, InvalidVarsSnafu, InvalidWaitDeploymentsSnafu, Result,
};
use crate::namespace::sanitize;
use crate::orchestrator::RolloutTarget;
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::fmt;
use std::path::PathBuf;

/// Default orchestration binary; versioned variants are `kubectl.<version>`.
pub const KUBECTL: &str = "kubectl";

/// CI metadata exposed to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DroneMetadata {
    pub build_number: String,
    pub commit: String,
    pub branch: String,
    pub tag: String,
}

/// Unvalidated configuration as read from flags and the environment.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub dry_run: bool,
    pub verbose: bool,
    pub project: String,
    pub zone: String,
    pub region: String,
    pub cluster_name: String,
    pub namespace: String,
    pub template_path: String,
    /// JSON object.
    pub vars: String,
    pub expand_env_vars: bool,
    pub drone: DroneMetadata,
    /// Each entry is a JSON list or a comma separated list.
    pub wait_deployments: Vec<String>,
    pub wait_seconds: u64,
    pub kubectl_version: String,
    /// Whitespace separated allow-list for `kubectl_version`.
    pub extra_kubectl_versions: String,
    pub credentials_path: String,
    pub record_change_cause: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            project: String::new(),
            zone: String::new(),
            region: String::new(),
            cluster_name: String::new(),
            namespace: String::new(),
            template_path: ".kube.yml".to_string(),
            vars: String::new(),
            expand_env_vars: false,
            drone: DroneMetadata::default(),
            wait_deployments: Vec::new(),
            wait_seconds: 0,
            kubectl_version: String::new(),
            extra_kubectl_versions: String::new(),
            credentials_path: String::new(),
            record_change_cause: true,
        }
    }
}

/// Where the cluster lives. Exactly one of the two is ever configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterLocation {
    Zone(String),
    Region(String),
}

impl ClusterLocation {
    /// `gcloud` flag selecting this location kind.
    pub fn flag(&self) -> &'static str {
        match self {
            ClusterLocation::Zone(_) => "--zone",
            ClusterLocation::Region(_) => "--region",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ClusterLocation::Zone(value) | ClusterLocation::Region(value) => value,
        }
    }
}

impl fmt::Display for ClusterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub location: ClusterLocation,
    pub cluster_name: String,
    pub namespace: Option<String>,
    pub kubectl_version: Option<String>,
    pub project: Option<String>,
    pub credentials_path: PathBuf,
    pub dry_run: bool,
    pub verbose: bool,
    pub wait_targets: Vec<RolloutTarget>,
    /// 0 disables the timeout wrapper.
    pub wait_seconds: u64,
    pub template_path: String,
    pub vars: Map<String, Value>,
    pub expand_env_vars: bool,
    pub drone: DroneMetadata,
    /// Emit `--record` on every apply.
    pub record_change_cause: bool,
}

impl DeploymentConfig {
    /// Validate `raw`: location exclusivity, cluster name, kubectl version
    /// allow-list, then the JSON-encoded inputs.
    pub fn resolve(raw: RawConfig) -> Result<Self> {
        let location = resolve_location(&raw.zone, &raw.region)?;

        if raw.cluster_name.trim().is_empty() {
            return ConfigValidationSnafu {
                reason: "Missing required param: cluster-name",
            }
            .fail();
        }

        let available: Vec<&str> = raw.extra_kubectl_versions.split_whitespace().collect();
        let kubectl_version = validate_kubectl_version(&raw.kubectl_version, &available)?;

        let vars = parse_vars(&raw.vars)?;
        let wait_targets = parse_wait_targets(&raw.wait_deployments)?;

        Ok(Self {
            location,
            cluster_name: raw.cluster_name,
            namespace: non_empty(raw.namespace),
            kubectl_version,
            project: non_empty(raw.project),
            credentials_path: PathBuf::from(raw.credentials_path),
            dry_run: raw.dry_run,
            verbose: raw.verbose,
            wait_targets,
            wait_seconds: raw.wait_seconds,
            template_path: raw.template_path,
            vars,
            expand_env_vars: raw.expand_env_vars,
            drone: raw.drone,
            record_change_cause: raw.record_change_cause,
        })
    }

    /// Binary used for every kubectl call of this run.
    pub fn kubectl(&self) -> String {
        match &self.kubectl_version {
            Some(version) => format!("{KUBECTL}.{version}"),
            None => KUBECTL.to_string(),
        }
    }

    /// Zone, or empty when the cluster is regional.
    pub fn zone(&self) -> &str {
        match &self.location {
            ClusterLocation::Zone(zone) => zone,
            ClusterLocation::Region(_) => "",
        }
    }

    /// Namespace as used against the cluster.
    pub fn sanitized_namespace(&self) -> Option<String> {
        self.namespace.as_deref().map(sanitize)
    }

    /// kubeconfig context written by `gcloud container clusters get-credentials`.
    pub fn context_name(&self, project: &str) -> String {
        ["gke", project, self.location.value(), &self.cluster_name].join("_")
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn resolve_location(zone: &str, region: &str) -> Result<ClusterLocation> {
    match (zone.trim().is_empty(), region.trim().is_empty()) {
        (true, true) => ConfigValidationSnafu {
            reason: "Missing required param: at least one of region or zone must be specified",
        }
        .fail(),
        (false, false) => ConfigValidationSnafu {
            reason: "Invalid params: at most one of region or zone may be specified",
        }
        .fail(),
        (false, true) => Ok(ClusterLocation::Zone(zone.to_string())),
        (true, false) => Ok(ClusterLocation::Region(region.to_string())),
    }
}

/// `Ok(None)` selects the default binary.
fn validate_kubectl_version(requested: &str, available: &[&str]) -> Result<Option<String>> {
    if requested.is_empty() {
        return Ok(None);
    }

    if available.is_empty() {
        return ConfigValidationSnafu {
            reason: format!(
                "Invalid param: kubectl-version was set to {requested} but no extra kubectl versions are available"
            ),
        }
        .fail();
    }

    if !available.contains(&requested) {
        return ConfigValidationSnafu {
            reason: format!(
                "Invalid param kubectl-version: {requested} must be one of {}",
                available.join(", ")
            ),
        }
        .fail();
    }

    Ok(Some(requested.to_string()))
}

fn parse_vars(raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(raw).context(InvalidVarsSnafu)
}

fn parse_wait_targets(values: &[String]) -> Result<Vec<RolloutTarget>> {
    let mut targets = Vec::new();

    for value in values.iter().map(|value| value.trim()) {
        if value.starts_with('[') {
            let names: Vec<String> =
                serde_json::from_str(value).context(InvalidWaitDeploymentsSnafu)?;
            targets.extend(
                names
                    .iter()
                    .map(|target| target.trim())
                    .filter(|target| !target.is_empty())
                    .map(RolloutTarget::parse),
            );
        } else {
            targets.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|target| !target.is_empty())
                    .map(RolloutTarget::parse),
            );
        }
    }

    Ok(targets)
}
