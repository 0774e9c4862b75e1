//! Deployment dispatch: manifest-apply vs. chart-install.
//!
//! Both methods hand off to Ansible; the chosen method only selects which
//! playbook runs. The kubectl playbook applies the raw manifests in a fixed
//! order; the helm playbook registers the chart repository and installs or
//! upgrades the release. Cluster identity travels as `--extra-vars`, never
//! as ambient environment.

use crate::errors::DeploymentError;
use crate::process::ProcessRunner;
use crate::vars::DeployVars;
use clap::ValueEnum;
use std::path::Path;

/// Deployment method selected with `--method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// Apply the raw Kubernetes manifests in order.
    Kubectl,
    /// Install/upgrade the packaged Helm chart release.
    Helm,
}

impl Method {
    /// Playbook file implementing this method, relative to the workspace.
    pub fn playbook(&self) -> &'static str {
        match self {
            Method::Kubectl => "ansible/deploy_jenkins.yml",
            Method::Helm => "ansible/deploy_jenkins_helm.yml",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Method::Kubectl => "manifest-apply (kubectl)",
            Method::Helm => "chart-install (helm)",
        }
    }
}

/// Invoke the configuration-management tool for the chosen method.
///
/// No rollback on failure: partial application state is left for operator
/// inspection.
pub async fn deploy(
    runner: &dyn ProcessRunner,
    workspace: &Path,
    method: Method,
    vars: &DeployVars,
) -> Result<(), DeploymentError> {
    let playbook = method.playbook();
    let playbook_path = workspace.join(playbook);
    if !playbook_path.is_file() {
        return Err(DeploymentError::PlaybookMissing {
            path: playbook_path,
        });
    }

    let extra_vars = format!(
        "project={} zone={} cluster_name={}",
        vars.project, vars.zone, vars.cluster_name
    );

    tracing::info!(method = method.display(), playbook, "dispatching deployment");

    let output = runner
        .run(
            "ansible-playbook",
            &[playbook, "--extra-vars", &extra_vars],
            Some(workspace),
        )
        .await
        .map_err(|source| DeploymentError::SpawnFailed { source })?;

    if !output.success() {
        return Err(DeploymentError::PlaybookFailed {
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }

    tracing::info!(method = method.display(), "deployment complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ToolOutput;
    use crate::process::testing::FakeRunner;
    use tempfile::tempdir;

    fn vars() -> DeployVars {
        DeployVars {
            project: "my-project".into(),
            region: "us-central1".into(),
            zone: "us-central1-a".into(),
            cluster_name: "my-gke-cluster".into(),
            public_ip: "203.0.113.7".into(),
        }
    }

    fn workspace_with_playbooks() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("20260101-120000");
        std::fs::create_dir_all(ws.join("ansible")).unwrap();
        std::fs::write(ws.join("ansible/deploy_jenkins.yml"), "- hosts: localhost\n").unwrap();
        std::fs::write(
            ws.join("ansible/deploy_jenkins_helm.yml"),
            "- hosts: localhost\n",
        )
        .unwrap();
        (dir, ws)
    }

    #[tokio::test]
    async fn kubectl_method_selects_manifest_playbook() {
        let (_dir, ws) = workspace_with_playbooks();
        let runner = FakeRunner::new();

        deploy(&runner, &ws, Method::Kubectl, &vars()).await.unwrap();

        let lines = runner.call_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ansible-playbook ansible/deploy_jenkins.yml"));
        assert!(lines[0].contains("project=my-project"));
        assert!(lines[0].contains("zone=us-central1-a"));
        assert!(lines[0].contains("cluster_name=my-gke-cluster"));
    }

    #[tokio::test]
    async fn helm_method_selects_chart_playbook() {
        let (_dir, ws) = workspace_with_playbooks();
        let runner = FakeRunner::new();

        deploy(&runner, &ws, Method::Helm, &vars()).await.unwrap();

        let lines = runner.call_lines();
        assert!(lines[0].starts_with("ansible-playbook ansible/deploy_jenkins_helm.yml"));
    }

    #[tokio::test]
    async fn runs_from_the_workspace_root() {
        let (_dir, ws) = workspace_with_playbooks();
        let runner = FakeRunner::new();

        deploy(&runner, &ws, Method::Kubectl, &vars()).await.unwrap();
        assert_eq!(runner.calls()[0].workdir, Some(ws));
    }

    #[tokio::test]
    async fn missing_playbook_is_fatal_before_invocation() {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("20260101-120000");
        std::fs::create_dir_all(&ws).unwrap();
        let runner = FakeRunner::new();

        let err = deploy(&runner, &ws, Method::Kubectl, &vars())
            .await
            .unwrap_err();
        assert!(matches!(err, DeploymentError::PlaybookMissing { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn playbook_failure_carries_captured_output() {
        let (_dir, ws) = workspace_with_playbooks();
        let runner = FakeRunner::new().on(
            "ansible-playbook",
            None,
            ToolOutput::failed(2, "fatal: [localhost]: FAILED!"),
        );

        let err = deploy(&runner, &ws, Method::Kubectl, &vars())
            .await
            .unwrap_err();
        match err {
            DeploymentError::PlaybookFailed { exit_code, output } => {
                assert_eq!(exit_code, 2);
                assert!(output.contains("FAILED!"));
            }
            other => panic!("Expected PlaybookFailed, got {other:?}"),
        }
    }

    #[test]
    fn value_enum_accepts_exactly_the_two_methods() {
        assert_eq!(
            Method::from_str("kubectl", true).unwrap(),
            Method::Kubectl
        );
        assert_eq!(Method::from_str("helm", true).unwrap(), Method::Helm);
        assert!(Method::from_str("kustomize", true).is_err());
    }
}
