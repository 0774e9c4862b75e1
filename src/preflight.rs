//! Pre-provisioning reconciliation of cloud resources.
//!
//! Before terraform runs, each resource it is about to create (cluster,
//! disk, firewall rule) is looked up in the project. A resource that
//! already exists is either imported into provisioner state — so planning
//! treats it as managed instead of failing on duplicate creation — or, when
//! the run targets a different cluster identity than the last recorded one,
//! the copied state file is wiped so the new target starts clean. Absence
//! of a resource is never an error.
//!
//! The import-vs-wipe choice is the pure function [`decide`], keyed on the
//! persisted target record; see DESIGN.md for the policy rationale.

use crate::errors::PreconditionError;
use crate::process::ProcessRunner;
use crate::vars::DeployVars;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the persistent disk resource in the terraform definitions.
pub const DISK_NAME: &str = "jenkins-disk";
/// Name of the firewall rule resource in the terraform definitions.
pub const FIREWALL_NAME: &str = "jenkins-firewall";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Cluster,
    Disk,
    FirewallRule,
}

impl ResourceKind {
    pub fn display(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::Disk => "disk",
            ResourceKind::FirewallRule => "firewall rule",
        }
    }

    /// Terraform resource address used for `terraform import`.
    fn address(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "google_container_cluster.primary",
            ResourceKind::Disk => "google_compute_disk.jenkins_disk",
            ResourceKind::FirewallRule => "google_compute_firewall.jenkins_firewall",
        }
    }

    /// Provider-format resource id for `terraform import`.
    fn import_id(&self, name: &str, vars: &DeployVars) -> String {
        match self {
            ResourceKind::Cluster => format!(
                "projects/{}/locations/{}/clusters/{}",
                vars.project, vars.zone, name
            ),
            ResourceKind::Disk => format!(
                "projects/{}/zones/{}/disks/{}",
                vars.project, vars.zone, name
            ),
            ResourceKind::FirewallRule => {
                format!("projects/{}/global/firewalls/{}", vars.project, name)
            }
        }
    }

    fn list_args(&self, name: &str, vars: &DeployVars) -> Vec<String> {
        match self {
            ResourceKind::Cluster => vec![
                "container".into(),
                "clusters".into(),
                "list".into(),
                format!("--filter=name={name}"),
                format!("--zone={}", vars.zone),
                format!("--project={}", vars.project),
                "--format=json".into(),
            ],
            ResourceKind::Disk => vec![
                "compute".into(),
                "disks".into(),
                "list".into(),
                format!("--filter=name={name}"),
                format!("--zones={}", vars.zone),
                format!("--project={}", vars.project),
                "--format=json".into(),
            ],
            ResourceKind::FirewallRule => vec![
                "compute".into(),
                "firewall-rules".into(),
                "list".into(),
                format!("--filter=name={name}"),
                format!("--project={}", vars.project),
                "--format=json".into(),
            ],
        }
    }
}

/// The ordered resource specs a run reconciles, cluster first.
pub fn resource_specs(vars: &DeployVars) -> Vec<(ResourceKind, String)> {
    vec![
        (ResourceKind::Cluster, vars.cluster_name.clone()),
        (ResourceKind::Disk, DISK_NAME.to_string()),
        (ResourceKind::FirewallRule, FIREWALL_NAME.to_string()),
    ]
}

/// Identity of the last successfully deployed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub project: String,
    pub zone: String,
    pub cluster_name: String,
}

impl TargetRecord {
    pub fn from_vars(vars: &DeployVars) -> Self {
        Self {
            project: vars.project.clone(),
            zone: vars.zone.clone(),
            cluster_name: vars.cluster_name.clone(),
        }
    }

    /// Load the record if one exists. An unreadable or unparsable record is
    /// treated as absent (first run) rather than fatal.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed target record");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create target record directory")?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize target record")?;
        std::fs::write(path, json).context("Failed to write target record")?;
        Ok(())
    }
}

/// How the current run's identity relates to the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatch {
    /// Same project, zone and cluster name as the last run.
    Same,
    /// The run targets a different cluster/project identity.
    Different,
    /// No record yet.
    FirstRun,
}

pub fn match_target(record: Option<&TargetRecord>, vars: &DeployVars) -> TargetMatch {
    match record {
        None => TargetMatch::FirstRun,
        Some(rec) if *rec == TargetRecord::from_vars(vars) => TargetMatch::Same,
        Some(_) => TargetMatch::Different,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Import the existing resource so planning treats it as managed.
    ImportIntoState,
    /// Discard the inherited state file before provisioning.
    WipeState,
    /// Nothing exists; the provisioner creates it fresh.
    CreateFresh,
}

/// The reconcile policy. Kept as a standalone pure function so the
/// import-vs-wipe criteria stay explicit and testable.
pub fn decide(found: bool, target: TargetMatch) -> ReconcileAction {
    match (found, target) {
        (false, _) => ReconcileAction::CreateFresh,
        (true, TargetMatch::Same | TargetMatch::FirstRun) => ReconcileAction::ImportIntoState,
        (true, TargetMatch::Different) => ReconcileAction::WipeState,
    }
}

/// What happened to one resource spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub kind: ResourceKind,
    pub name: String,
    pub action: ReconcileAction,
}

/// Query the provider for each spec and apply the decided action inside the
/// workspace. `record` is the target identity persisted by the previous
/// successful run, if any.
pub async fn reconcile_preexisting(
    runner: &dyn ProcessRunner,
    workspace: &Path,
    vars: &DeployVars,
    record: Option<&TargetRecord>,
) -> Result<Vec<ReconcileOutcome>, PreconditionError> {
    let target = match_target(record, vars);
    let terraform_dir = workspace.join("terraform");
    let mut outcomes = Vec::new();

    for (kind, name) in resource_specs(vars) {
        let found = query_exists(runner, kind, &name, vars).await?;
        let action = decide(found, target);
        tracing::info!(
            kind = kind.display(),
            name = %name,
            found,
            action = ?action,
            "reconciled"
        );

        match action {
            ReconcileAction::ImportIntoState => {
                import_resource(runner, &terraform_dir, kind, &name, vars).await?;
            }
            ReconcileAction::WipeState => {
                wipe_state(&terraform_dir)?;
            }
            ReconcileAction::CreateFresh => {}
        }

        outcomes.push(ReconcileOutcome { kind, name, action });
    }

    Ok(outcomes)
}

async fn query_exists(
    runner: &dyn ProcessRunner,
    kind: ResourceKind,
    name: &str,
    vars: &DeployVars,
) -> Result<bool, PreconditionError> {
    let args = kind.list_args(name, vars);
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    let output = runner
        .run("gcloud", &arg_refs, None)
        .await
        .map_err(|e| PreconditionError::QueryFailed {
            kind: kind.display().to_string(),
            name: name.to_string(),
            exit_code: -1,
            output: format!("{e:#}"),
        })?;

    if !output.success() {
        return Err(PreconditionError::QueryFailed {
            kind: kind.display().to_string(),
            name: name.to_string(),
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }

    let listed: Vec<serde_json::Value> = serde_json::from_str(output.stdout.trim()).map_err(
        |source| PreconditionError::MalformedResponse {
            kind: kind.display().to_string(),
            name: name.to_string(),
            source,
        },
    )?;

    Ok(!listed.is_empty())
}

async fn import_resource(
    runner: &dyn ProcessRunner,
    terraform_dir: &Path,
    kind: ResourceKind,
    name: &str,
    vars: &DeployVars,
) -> Result<(), PreconditionError> {
    let id = kind.import_id(name, vars);
    let output = runner
        .run(
            "terraform",
            &[
                "import",
                "-input=false",
                "-var-file=variables.tfvars",
                kind.address(),
                &id,
            ],
            Some(terraform_dir),
        )
        .await
        .map_err(|e| PreconditionError::ImportFailed {
            kind: kind.display().to_string(),
            name: name.to_string(),
            output: format!("{e:#}"),
        })?;

    if !output.success() {
        return Err(PreconditionError::ImportFailed {
            kind: kind.display().to_string(),
            name: name.to_string(),
            output: output.combined(),
        });
    }
    Ok(())
}

/// Delete the state file (and its backup) inherited by this workspace.
/// Intentional data loss: state from an unrelated target corrupts planning.
fn wipe_state(terraform_dir: &Path) -> Result<(), PreconditionError> {
    for file in ["terraform.tfstate", "terraform.tfstate.backup"] {
        let path = terraform_dir.join(file);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|source| PreconditionError::WipeFailed { path: path.clone(), source })?;
            tracing::info!(path = %path.display(), "wiped provisioner state");
        }
    }
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

    fn workspace_with_state() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let ws = dir.path().join("20260101-120000");
        std::fs::create_dir_all(ws.join("terraform")).unwrap();
        std::fs::write(ws.join("terraform/terraform.tfstate"), "{}").unwrap();
        std::fs::write(ws.join("terraform/terraform.tfstate.backup"), "{}").unwrap();
        (dir, ws)
    }

    #[test]
    fn decision_table_is_exhaustive() {
        use ReconcileAction::*;
        use TargetMatch::*;
        assert_eq!(decide(false, Same), CreateFresh);
        assert_eq!(decide(false, Different), CreateFresh);
        assert_eq!(decide(false, FirstRun), CreateFresh);
        assert_eq!(decide(true, Same), ImportIntoState);
        assert_eq!(decide(true, FirstRun), ImportIntoState);
        assert_eq!(decide(true, Different), WipeState);
    }

    #[test]
    fn match_target_compares_identity() {
        let v = vars();
        assert_eq!(match_target(None, &v), TargetMatch::FirstRun);

        let same = TargetRecord::from_vars(&v);
        assert_eq!(match_target(Some(&same), &v), TargetMatch::Same);

        let different = TargetRecord {
            project: "other-project".into(),
            ..same
        };
        assert_eq!(match_target(Some(&different), &v), TargetMatch::Different);
    }

    #[test]
    fn target_record_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".jenkinsup/last-target.json");
        let record = TargetRecord::from_vars(&vars());

        record.save(&path).unwrap();
        assert_eq!(TargetRecord::load(&path), Some(record));
    }

    #[test]
    fn malformed_target_record_reads_as_first_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last-target.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(TargetRecord::load(&path), None);
    }

    #[tokio::test]
    async fn absent_resources_create_fresh_without_importing() {
        let (_dir, ws) = workspace_with_state();
        let runner = FakeRunner::new().on("gcloud", None, ToolOutput::ok("[]"));

        let outcomes = reconcile_preexisting(&runner, &ws, &vars(), None)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(
            outcomes
                .iter()
                .all(|o| o.action == ReconcileAction::CreateFresh)
        );
        assert!(!runner.programs().contains(&"terraform".to_string()));
    }

    #[tokio::test]
    async fn existing_resources_are_imported_on_same_target() {
        let (_dir, ws) = workspace_with_state();
        let v = vars();
        let record = TargetRecord::from_vars(&v);
        let runner = FakeRunner::new().on("gcloud", None, ToolOutput::ok(r#"[{"name": "x"}]"#));

        let outcomes = reconcile_preexisting(&runner, &ws, &v, Some(&record))
            .await
            .unwrap();

        assert!(
            outcomes
                .iter()
                .all(|o| o.action == ReconcileAction::ImportIntoState)
        );
        let lines = runner.call_lines();
        let imports: Vec<&String> = lines.iter().filter(|l| l.contains("import")).collect();
        assert_eq!(imports.len(), 3);
        assert!(imports[0].contains("google_container_cluster.primary"));
        assert!(
            imports[0].contains("projects/my-project/locations/us-central1-a/clusters/my-gke-cluster")
        );
        assert!(imports[1].contains("google_compute_disk.jenkins_disk"));
        assert!(imports[2].contains("projects/my-project/global/firewalls/jenkins-firewall"));
    }

    #[tokio::test]
    async fn second_run_against_same_target_never_recreates() {
        // Idempotence: a rerun finds everything the first run created and
        // imports it, so terraform plan sees managed resources.
        let (_dir, ws) = workspace_with_state();
        let v = vars();
        let record = TargetRecord::from_vars(&v);
        let runner = FakeRunner::new().on("gcloud", None, ToolOutput::ok(r#"[{"name": "x"}]"#));

        let outcomes = reconcile_preexisting(&runner, &ws, &v, Some(&record))
            .await
            .unwrap();
        assert!(
            outcomes
                .iter()
                .all(|o| o.action != ReconcileAction::CreateFresh)
        );
    }

    #[tokio::test]
    async fn different_target_wipes_inherited_state() {
        let (_dir, ws) = workspace_with_state();
        let v = vars();
        let record = TargetRecord {
            project: "previous-project".into(),
            zone: v.zone.clone(),
            cluster_name: v.cluster_name.clone(),
        };
        let runner = FakeRunner::new().on("gcloud", None, ToolOutput::ok(r#"[{"name": "x"}]"#));

        let outcomes = reconcile_preexisting(&runner, &ws, &v, Some(&record))
            .await
            .unwrap();

        assert!(
            outcomes
                .iter()
                .all(|o| o.action == ReconcileAction::WipeState)
        );
        assert!(!ws.join("terraform/terraform.tfstate").exists());
        assert!(!ws.join("terraform/terraform.tfstate.backup").exists());
        // No imports against a freshly wiped lineage.
        assert!(!runner.programs().contains(&"terraform".to_string()));
    }

    #[tokio::test]
    async fn query_failure_is_a_precondition_error() {
        let (_dir, ws) = workspace_with_state();
        let runner = FakeRunner::new().on(
            "gcloud",
            None,
            ToolOutput::failed(1, "ERROR: (gcloud.auth) credentials expired"),
        );

        let err = reconcile_preexisting(&runner, &ws, &vars(), None)
            .await
            .unwrap_err();
        match err {
            PreconditionError::QueryFailed { exit_code, output, .. } => {
                assert_eq!(exit_code, 1);
                assert!(output.contains("credentials expired"));
            }
            other => panic!("Expected QueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_listing_is_a_precondition_error() {
        let (_dir, ws) = workspace_with_state();
        let runner = FakeRunner::new().on("gcloud", None, ToolOutput::ok("not json"));

        let err = reconcile_preexisting(&runner, &ws, &vars(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PreconditionError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn specs_are_ordered_cluster_disk_firewall() {
        let v = vars();
        let specs = resource_specs(&v);
        assert_eq!(specs[0].0, ResourceKind::Cluster);
        assert_eq!(specs[0].1, "my-gke-cluster");
        assert_eq!(specs[1].0, ResourceKind::Disk);
        assert_eq!(specs[1].1, DISK_NAME);
        assert_eq!(specs[2].0, ResourceKind::FirewallRule);
        assert_eq!(specs[2].1, FIREWALL_NAME);
    }
}
