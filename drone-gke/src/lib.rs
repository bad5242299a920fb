//! # drone-gke
//!
//! Drone CI step deploying a templated Kubernetes manifest to a GKE cluster.
//!
//! A run validates its configuration, resolves the GCP project, renders the
//! manifest read from stdin, then drives `gcloud`/`kubectl` through a fixed
//! pipeline: authenticate, fetch credentials, print the kubectl version,
//! ensure the namespace, validate with a dry-run, apply, and wait for
//! rollouts. The first failure ends the run.

pub mod cli;
pub mod config;
pub mod error;
pub mod namespace;
pub mod orchestrator;
pub mod project;
pub mod runner;
pub mod template;

pub use config::{ClusterLocation, DeploymentConfig, DroneMetadata, RawConfig};
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{RolloutTarget, Stage, StageContext, deploy, run_pipeline};
pub use runner::{CommandRunner, DuctRunner, RecordingRunner};
pub use template::{RenderedManifest, TemplateData, read_template, render};
