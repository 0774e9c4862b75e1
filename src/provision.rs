//! Terraform plan/apply cycle inside the run workspace.
//!
//! Three stages run in order: `init`, `plan` (saved to a plan file), and
//! `apply` of that saved plan. A non-zero exit at any stage is fatal and is
//! never retried; infrastructure changes are not assumed safely retryable
//! without operator review. On success the terraform outputs are resolved
//! so later stages can log the created resource identifiers.

use crate::errors::ProvisionError;
use crate::process::{ProcessRunner, ToolOutput};
use std::collections::HashMap;
use std::path::Path;

const PLAN_FILE: &str = "tfplan";

/// Parsed `terraform output -json` values.
#[derive(Debug, Clone, Default)]
pub struct TerraformOutputs(HashMap<String, serde_json::Value>);

impl TerraformOutputs {
    fn parse(json: &str) -> Result<Self, serde_json::Error> {
        // Each output is wrapped as {"value": ..., "type": ...}.
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let values = raw
            .into_iter()
            .map(|(name, entry)| {
                let value = entry.get("value").cloned().unwrap_or(entry);
                (name, value)
            })
            .collect();
        Ok(Self(values))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Run the full init/plan/apply cycle in `<workspace>/terraform`.
pub async fn apply_infrastructure(
    runner: &dyn ProcessRunner,
    workspace: &Path,
) -> Result<TerraformOutputs, ProvisionError> {
    let terraform_dir = workspace.join("terraform");

    let stages: [(&str, Vec<&str>); 3] = [
        ("init", vec!["init", "-input=false"]),
        (
            "plan",
            vec![
                "plan",
                "-input=false",
                "-var-file=variables.tfvars",
                "-out",
                PLAN_FILE,
            ],
        ),
        ("apply", vec!["apply", "-input=false", "-auto-approve", PLAN_FILE]),
    ];

    for (stage, args) in stages {
        tracing::info!(stage, "running terraform");
        let output = run_terraform(runner, &args, &terraform_dir).await?;
        if !output.success() {
            return Err(ProvisionError::StageFailed {
                stage: stage.to_string(),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
    }

    let output = run_terraform(runner, &["output", "-json"], &terraform_dir).await?;
    if !output.success() {
        return Err(ProvisionError::StageFailed {
            stage: "output".to_string(),
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }

    let outputs = TerraformOutputs::parse(output.stdout.trim())
        .map_err(|source| ProvisionError::OutputsUnreadable { source })?;

    if let Some(endpoint) = outputs.get_str("cluster_endpoint") {
        tracing::info!(endpoint, "cluster provisioned");
    }

    Ok(outputs)
}

async fn run_terraform(
    runner: &dyn ProcessRunner,
    args: &[&str],
    terraform_dir: &Path,
) -> Result<ToolOutput, ProvisionError> {
    runner
        .run("terraform", args, Some(terraform_dir))
        .await
        .map_err(|source| ProvisionError::SpawnFailed { source })
}
