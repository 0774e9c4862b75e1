//! Cluster credential binding and liveness verification.
//!
//! After provisioning, `gcloud container clusters get-credentials` merges
//! the new cluster into the ambient kube-context. Freshly created clusters
//! have a not-yet-ready window, so reachability is verified by polling a
//! node listing with a bounded retry budget before deployment proceeds.

use crate::errors::ContextError;
use crate::process::ProcessRunner;
use crate::vars::DeployVars;
use std::time::Duration;

/// Bounded retry budget for the liveness probe. Injectable so tests run in
/// milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(10),
        }
    }
}

/// Fetch credentials for the cluster, then poll until a node listing
/// succeeds or the retry budget is exhausted.
pub async fn bind_context(
    runner: &dyn ProcessRunner,
    vars: &DeployVars,
    policy: RetryPolicy,
) -> Result<(), ContextError> {
    let output = runner
        .run(
            "gcloud",
            &[
                "container",
                "clusters",
                "get-credentials",
                &vars.cluster_name,
                "--zone",
                &vars.zone,
                "--project",
                &vars.project,
            ],
            None,
        )
        .await
        .map_err(|source| ContextError::SpawnFailed { source })?;

    if !output.success() {
        return Err(ContextError::CredentialsFailed {
            exit_code: output.exit_code,
            output: output.combined(),
        });
    }

    tracing::info!(cluster = %vars.cluster_name, "credentials merged into kube-context");

    for attempt in 1..=policy.attempts {
        let probe = runner
            .run("kubectl", &["get", "nodes", "--no-headers"], None)
            .await
            .map_err(|source| ContextError::SpawnFailed { source })?;

        if probe.success() {
            tracing::info!(attempt, "cluster reachable");
            return Ok(());
        }

        tracing::warn!(
            attempt,
            max = policy.attempts,
            "cluster not yet reachable"
        );
        if attempt < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(ContextError::ClusterUnreachable {
        attempts: policy.attempts,
    })
}
