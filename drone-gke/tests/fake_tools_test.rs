//! Full binary runs against stand-in `gcloud`, `kubectl` and `timeout`
//! scripts that log their arguments.

#![cfg(unix)]

use assert_cmd::Command;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

// Writing executables while another test forks can hit ETXTBSY.
static SERIAL: Mutex<()> = Mutex::new(());

const FAKE_TOOL: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$FAKE_LOG"
if [ -n "$FAKE_FAIL" ]; then
  case "$(basename "$0") $*" in
    *"$FAKE_FAIL"*) echo "fake failure" >&2; exit "${FAKE_EXIT:-1}" ;;
  esac
fi
if [ "$1" = "apply" ]; then
  cat >> "$FAKE_LOG.stdin"
fi
exit 0
"#;

struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for tool in ["gcloud", "kubectl", "kubectl.1.14", "timeout"] {
            let path = dir.path().join(tool);
            fs::write(&path, FAKE_TOOL).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        fs::write(
            dir.path().join("key.json"),
            r#"{"type": "service_account", "project_id": "from-key"}"#,
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn log_path(&self) -> PathBuf {
        self.path().join("calls.log")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn applied(&self) -> String {
        fs::read_to_string(self.path().join("calls.log.stdin")).unwrap_or_default()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("drone-gke").unwrap();
        cmd.env_clear()
            .env("PATH", format!("{}:/usr/bin:/bin", self.path().display()))
            .env("FAKE_LOG", self.log_path())
            .env("GOOGLE_APPLICATION_CREDENTIALS", self.path().join("key.json"))
            .env("PLUGIN_ZONE", "us-central1-a")
            .env("PLUGIN_CLUSTER_NAME", "demo");
        cmd
    }
}

fn serial() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn test_end_to_end_deploy() {
    let _guard = serial();
    let tools = FakeTools::new();

    tools
        .command()
        .env("PLUGIN_VARS", r#"{"color":"blue"}"#)
        .write_stdin("color: {{ .color }}")
        .assert()
        .success();

    let key = tools.path().join("key.json");
    assert_eq!(
        tools.calls(),
        vec![
            format!("gcloud auth activate-service-account --key-file {}", key.display()),
            "gcloud container clusters get-credentials demo --project from-key --zone us-central1-a"
                .to_string(),
            "kubectl version".to_string(),
            "kubectl apply --record --dry-run -f -".to_string(),
            "kubectl apply --record -f -".to_string(),
        ]
    );
    assert_eq!(tools.applied(), "color: bluecolor: blue");
}

#[test]
fn test_shadowed_var_runs_nothing() {
    let _guard = serial();
    let tools = FakeTools::new();

    let output = tools
        .command()
        .env("PLUGIN_VARS", r#"{"project":"override"}"#)
        .write_stdin("color: {{ .color }}")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("shadows existing var"));
    assert!(tools.calls().is_empty());
}

#[test]
fn test_undefined_key_runs_nothing() {
    let _guard = serial();
    let tools = FakeTools::new();

    tools
        .command()
        .write_stdin("image: {{ .image }}")
        .assert()
        .failure()
        .code(1);

    assert!(tools.calls().is_empty());
}

#[test]
fn test_namespace_versioned_kubectl_and_waits() {
    let _guard = serial();
    let tools = FakeTools::new();

    let output = tools
        .command()
        .env("PLUGIN_NAMESPACE", "My_NS!")
        .env("PLUGIN_KUBECTL_VERSION", "1.14")
        .env("EXTRA_KUBECTL_VERSIONS", "1.13 1.14")
        .env("PLUGIN_WAIT_DEPLOYMENTS", r#"["web","statefulset/db"]"#)
        .env("PLUGIN_WAIT_SECONDS", "30")
        .write_stdin("kind: Deployment\n")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .contains("Waiting until rollout completes for deployment/web 1/2")
    );

    let calls = tools.calls();
    assert_eq!(
        &calls[3..],
        &[
            "kubectl.1.14 config set-context gke_from-key_us-central1-a_demo --namespace my-ns-",
            "kubectl.1.14 apply --record -f -",
            "kubectl.1.14 apply --record --dry-run -f -",
            "kubectl.1.14 apply --record -f -",
            "timeout 30 kubectl.1.14 rollout status deployment/web --namespace my-ns-",
            "timeout 30 kubectl.1.14 rollout status statefulset/db --namespace my-ns-",
        ]
    );
    assert!(tools.applied().starts_with("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: my-ns-\n"));
}

#[test]
fn test_dry_run_applies_only_with_dry_run_flag() {
    let _guard = serial();
    let tools = FakeTools::new();

    tools
        .command()
        .env("PLUGIN_DRY_RUN", "true")
        .write_stdin("kind: Deployment\n")
        .assert()
        .success();

    let applies: Vec<String> = tools
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("kubectl apply"))
        .collect();
    assert_eq!(applies, vec!["kubectl apply --record --dry-run -f -"]);
}

#[test]
fn test_failed_rollout_stops_remaining_waits() {
    let _guard = serial();
    let tools = FakeTools::new();

    let output = tools
        .command()
        .env("PLUGIN_WAIT_DEPLOYMENTS", "first,second,third")
        .env("FAKE_FAIL", "deployment/second")
        .write_stdin("kind: Deployment\n")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let waits: Vec<String> = tools
        .calls()
        .into_iter()
        .filter(|call| call.contains("rollout status"))
        .collect();
    assert_eq!(
        waits,
        vec![
            "kubectl rollout status deployment/first",
            "kubectl rollout status deployment/second",
        ]
    );
}

#[test]
fn test_expired_timeout_is_reported() {
    let _guard = serial();
    let tools = FakeTools::new();

    let output = tools
        .command()
        .env("PLUGIN_WAIT_DEPLOYMENTS", "web")
        .env("PLUGIN_WAIT_SECONDS", "5")
        .env("FAKE_FAIL", "rollout status")
        .env("FAKE_EXIT", "124")
        .write_stdin("kind: Deployment\n")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(
        String::from_utf8_lossy(&output.stderr)
            .contains("Rollout of deployment/web did not complete within 5s")
    );
}

#[test]
fn test_failed_validation_shows_kubectl_output_once() {
    let _guard = serial();
    let tools = FakeTools::new();

    let output = tools
        .command()
        .env("FAKE_FAIL", "--dry-run")
        .write_stdin("kind: Deployment\n")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("fake failure").count(), 1, "{stdout}");
    assert!(stdout.contains("The dry-run rejected the manifest"));
    assert!(!tools.calls().contains(&"kubectl apply --record -f -".to_string()));
}
