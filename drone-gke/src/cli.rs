//! Command line and environment surface
//!
//! Every flag falls back to the variable Drone sets for plugin settings
//! (`PLUGIN_*`) or build metadata (`DRONE_*`).

use crate::config::{DroneMetadata, RawConfig};
use clap::{ArgAction, Parser};

#[derive(Debug, Parser, Clone)]
#[clap(
    name = "drone-gke",
    version,
    about = "Deploy a templated Kubernetes manifest to GKE",
    after_help = "The manifest template is read from stdin, e.g. `cat .kube.yml | drone-gke`"
)]
pub struct Cli {
    /// Do not apply the Kubernetes manifests to the API server
    #[clap(long, env = "PLUGIN_DRY_RUN")]
    pub dry_run: bool,

    /// Dump available vars and the generated Kubernetes manifest, keeping secrets hidden
    #[clap(long, env = "PLUGIN_VERBOSE")]
    pub verbose: bool,

    /// GCP project name (default: interpreted from JSON credentials)
    #[clap(long, env = "PLUGIN_PROJECT")]
    pub project: Option<String>,

    /// Zone of the container cluster
    #[clap(long, env = "PLUGIN_ZONE")]
    pub zone: Option<String>,

    /// Region of the container cluster
    #[clap(long, env = "PLUGIN_REGION")]
    pub region: Option<String>,

    /// Name of the container cluster
    #[clap(long, env = "PLUGIN_CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// Kubernetes namespace to operate in
    #[clap(long, env = "PLUGIN_NAMESPACE")]
    pub namespace: Option<String>,

    /// Template for Kubernetes resources, e.g. Deployments (used to label errors; the content is read from stdin)
    #[clap(long, env = "PLUGIN_TEMPLATE", default_value = ".kube.yml")]
    pub kube_template: String,

    /// Variables to use while templating manifests, in JSON format
    #[clap(long, env = "PLUGIN_VARS")]
    pub vars: Option<String>,

    /// Expand environment variables contents on vars
    #[clap(long, env = "PLUGIN_EXPAND_ENV_VARS")]
    pub expand_env_vars: bool,

    /// Drone build number
    #[clap(long, env = "DRONE_BUILD_NUMBER")]
    pub drone_build_number: Option<String>,

    /// Git commit hash
    #[clap(long, env = "DRONE_COMMIT")]
    pub drone_commit: Option<String>,

    /// Git branch
    #[clap(long, env = "DRONE_BRANCH")]
    pub drone_branch: Option<String>,

    /// Git tag
    #[clap(long, env = "DRONE_TAG")]
    pub drone_tag: Option<String>,

    /// Deployments to wait for with `kubectl rollout status`, as a JSON list or comma separated
    #[clap(long, env = "PLUGIN_WAIT_DEPLOYMENTS")]
    pub wait_deployments: Vec<String>,

    /// If wait-deployments is set, number of seconds to wait before failing the build (0 waits forever)
    #[clap(long, env = "PLUGIN_WAIT_SECONDS", default_value_t = 0)]
    pub wait_seconds: u64,

    /// Version of the kubectl binary to use, e.g. 1.14
    #[clap(long, env = "PLUGIN_KUBECTL_VERSION")]
    pub kubectl_version: Option<String>,

    /// Space separated kubectl versions installed next to the default one
    #[clap(long, env = "EXTRA_KUBECTL_VERSIONS")]
    pub extra_kubectl_versions: Option<String>,

    /// Path to the service account JSON key
    #[clap(long = "credentials", env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<String>,

    /// Record the command as the change cause on applied objects (`kubectl apply --record`)
    #[clap(long, env = "PLUGIN_RECORD", default_value_t = true, action = ArgAction::Set)]
    pub record_change_cause: bool,
}

impl From<Cli> for RawConfig {
    fn from(cli: Cli) -> Self {
        RawConfig {
            dry_run: cli.dry_run,
            verbose: cli.verbose,
            project: cli.project.unwrap_or_default(),
            zone: cli.zone.unwrap_or_default(),
            region: cli.region.unwrap_or_default(),
            cluster_name: cli.cluster_name.unwrap_or_default(),
            namespace: cli.namespace.unwrap_or_default(),
            template_path: cli.kube_template,
            vars: cli.vars.unwrap_or_default(),
            expand_env_vars: cli.expand_env_vars,
            drone: DroneMetadata {
                build_number: cli.drone_build_number.unwrap_or_default(),
                commit: cli.drone_commit.unwrap_or_default(),
                branch: cli.drone_branch.unwrap_or_default(),
                tag: cli.drone_tag.unwrap_or_default(),
            },
            wait_deployments: cli.wait_deployments,
            wait_seconds: cli.wait_seconds,
            kubectl_version: cli.kubectl_version.unwrap_or_default(),
            extra_kubectl_versions: cli.extra_kubectl_versions.unwrap_or_default(),
            credentials_path: cli.credentials.unwrap_or_default(),
            record_change_cause: cli.record_change_cause,
        }
    }
}
