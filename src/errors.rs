//! Typed error hierarchy for the jenkinsup orchestrator.
//!
//! One enum per pipeline stage, unified by `RunError`:
//! - `WorkspaceError` — workspace creation failures
//! - `DependencyError` — missing or uninstallable tooling
//! - `PreconditionError` — cloud resource reconciliation failures
//! - `ProvisionError` — terraform init/plan/apply failures
//! - `ContextError` — credential binding and cluster liveness failures
//! - `DeploymentError` — ansible dispatch failures
//!
//! Every variant is fatal; the orchestrator never proceeds past a stage
//! that returned one of these.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from workspace creation. Retention cleanup is best-effort and
/// never produces one of these.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Source tree missing at {path}")]
    MissingSource { path: PathBuf },

    #[error("Failed to create workspace directory {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {path} into workspace: {source}")]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the dependency installer.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Required tool '{tool}' is not installed and cannot be auto-installed: {hint}")]
    NotInstallable { tool: String, hint: String },

    #[error("Failed to install '{tool}' via {installer}:\n{output}")]
    InstallFailed {
        tool: String,
        installer: String,
        output: String,
    },
}

/// Errors from the resource precondition checker.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Cloud query for {kind} '{name}' failed (exit {exit_code}):\n{output}")]
    QueryFailed {
        kind: String,
        name: String,
        exit_code: i32,
        output: String,
    },

    #[error("Unexpected response listing {kind} '{name}': {source}")]
    MalformedResponse {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to import {kind} '{name}' into provisioner state:\n{output}")]
    ImportFailed {
        kind: String,
        name: String,
        output: String,
    },

    #[error("Failed to wipe provisioner state at {path}: {source}")]
    WipeFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the provisioning driver. Carries the terraform stage that
/// failed and its captured output for operator review.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("terraform {stage} failed (exit {exit_code}):\n{output}")]
    StageFailed {
        stage: String,
        exit_code: i32,
        output: String,
    },

    #[error("Failed to read terraform outputs: {source}")]
    OutputsUnreadable {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to spawn terraform: {source}")]
    SpawnFailed {
        #[source]
        source: anyhow::Error,
    },
}

/// Errors from the cluster context binder.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to fetch cluster credentials (exit {exit_code}):\n{output}")]
    CredentialsFailed { exit_code: i32, output: String },

    #[error("Cluster did not become reachable after {attempts} attempts")]
    ClusterUnreachable { attempts: u32 },

    #[error("Failed to invoke cluster CLI: {source}")]
    SpawnFailed {
        #[source]
        source: anyhow::Error,
    },
}

/// Errors from the deployment dispatcher.
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("Playbook not found at {path}")]
    PlaybookMissing { path: PathBuf },

    #[error("ansible-playbook failed (exit {exit_code}):\n{output}")]
    PlaybookFailed { exit_code: i32, output: String },

    #[error("Failed to spawn ansible-playbook: {source}")]
    SpawnFailed {
        #[source]
        source: anyhow::Error,
    },
}

/// Top-level error for a run. Each variant maps to the stage that failed,
/// so the reporter can name it.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Dependencies(#[from] DependencyError),

    #[error(transparent)]
    Preconditions(#[from] PreconditionError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error(transparent)]
    Setup(#[from] anyhow::Error),
}

impl RunError {
    /// Name of the pipeline stage this error belongs to.
    pub fn stage_name(&self) -> &'static str {
        match self {
            RunError::Workspace(_) => "workspace",
            RunError::Dependencies(_) => "dependencies",
            RunError::Preconditions(_) => "preconditions",
            RunError::Provision(_) => "provision",
            RunError::Context(_) => "bind-context",
            RunError::Deployment(_) => "deploy",
            RunError::Setup(_) => "setup",
        }
    }
}
