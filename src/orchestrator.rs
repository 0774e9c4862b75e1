//! The sequential run pipeline.
//!
//! Stages execute strictly in order — workspace, dependencies,
//! preconditions, provision, bind context, deploy — with early exit on the
//! first failure. Each stage returns success-with-value or a typed error;
//! nothing proceeds past a failed stage, no stage is re-entered, and the
//! supported recovery path is rerunning from the start (the precondition
//! checker makes that idempotent).

use crate::config::Config;
use crate::context::{self, RetryPolicy};
use crate::deploy;
use crate::deps;
use crate::errors::RunError;
use crate::preflight::{self, TargetRecord};
use crate::process::ProcessRunner;
use crate::provision;
use crate::ui::RunUi;
use crate::vars::DeployVars;
use crate::workspace::{TIMESTAMP_FORMAT, WorkspaceManager};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Lifecycle of one run. `Failed` is terminal; the process exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    WorkspaceReady,
    DepsReady,
    PreconditionsChecked,
    Provisioned,
    ContextBound,
    Deployed,
    Done,
    Failed,
}

impl RunStage {
    pub fn name(&self) -> &'static str {
        match self {
            RunStage::Init => "INIT",
            RunStage::WorkspaceReady => "WORKSPACE_READY",
            RunStage::DepsReady => "DEPS_READY",
            RunStage::PreconditionsChecked => "PRECONDITIONS_CHECKED",
            RunStage::Provisioned => "PROVISIONED",
            RunStage::ContextBound => "CONTEXT_BOUND",
            RunStage::Deployed => "DEPLOYED",
            RunStage::Done => "DONE",
            RunStage::Failed => "FAILED",
        }
    }

    /// The forward path of the state machine, in order.
    pub fn pipeline() -> [RunStage; 8] {
        [
            RunStage::Init,
            RunStage::WorkspaceReady,
            RunStage::DepsReady,
            RunStage::PreconditionsChecked,
            RunStage::Provisioned,
            RunStage::ContextBound,
            RunStage::Deployed,
            RunStage::Done,
        ]
    }
}

/// One invocation of the orchestrator. Exists for the process duration;
/// leaves nothing behind but its workspace directory.
#[derive(Debug)]
pub struct Run {
    pub started_at: DateTime<Utc>,
    pub method: deploy::Method,
    pub stage: RunStage,
    pub workspace: Option<PathBuf>,
}

impl Run {
    fn new(method: deploy::Method) -> Self {
        Self {
            started_at: Utc::now(),
            method,
            stage: RunStage::Init,
            workspace: None,
        }
    }

    /// Workspace identifier derived from the start timestamp.
    pub fn timestamp(&self) -> String {
        self.started_at.format(TIMESTAMP_FORMAT).to_string()
    }

    fn advance(&mut self, stage: RunStage) {
        tracing::info!(from = self.stage.name(), to = stage.name(), "stage transition");
        self.stage = stage;
    }
}

pub struct Orchestrator<'r> {
    config: Config,
    runner: &'r dyn ProcessRunner,
    policy: RetryPolicy,
    ui: RunUi,
}

impl<'r> Orchestrator<'r> {
    pub fn new(config: Config, runner: &'r dyn ProcessRunner) -> Self {
        Self {
            config,
            runner,
            policy: RetryPolicy::default(),
            ui: RunUi::new(6),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Drive the pipeline to completion. On error the run is left in
    /// `Failed` and the caller reports the failing stage.
    pub async fn run(&self) -> Result<Run, RunError> {
        let mut run = Run::new(self.config.method);
        match self.drive(&mut run).await {
            Ok(()) => Ok(run),
            Err(e) => {
                run.advance(RunStage::Failed);
                self.ui.stage_failed(e.stage_name());
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut Run) -> Result<(), RunError> {
        self.config.ensure_directories()?;
        let vars = DeployVars::load(&self.config.vars_file)?;

        // Workspace
        self.ui.stage_start(1, "workspace");
        let manager = WorkspaceManager::new(
            &self.config.repo_root,
            vec![
                self.config.terraform_src.clone(),
                self.config.ansible_src.clone(),
            ],
        );
        let workspace = manager.create(&run.timestamp())?;
        run.workspace = Some(workspace.clone());
        run.advance(RunStage::WorkspaceReady);
        self.ui.stage_done("workspace");

        // Dependencies
        self.ui.stage_start(2, "dependencies");
        let tools = deps::required_tools(self.config.method);
        let statuses = deps::ensure_tools(self.runner, &tools).await?;
        for status in &statuses {
            if status.installed {
                tracing::info!(tool = status.name, "installed");
            }
        }
        run.advance(RunStage::DepsReady);
        self.ui.stage_done("dependencies");

        // Preconditions
        self.ui.stage_start(3, "preconditions");
        let record = TargetRecord::load(&self.config.target_record_path());
        preflight::reconcile_preexisting(self.runner, &workspace, &vars, record.as_ref()).await?;
        run.advance(RunStage::PreconditionsChecked);
        self.ui.stage_done("preconditions");

        // Provision
        self.ui.stage_start(4, "provision");
        let spinner = self.ui.spinner("terraform apply in progress");
        let result = provision::apply_infrastructure(self.runner, &workspace).await;
        spinner.finish_and_clear();
        result?;
        run.advance(RunStage::Provisioned);
        self.ui.stage_done("provision");

        // Bind context
        self.ui.stage_start(5, "bind-context");
        let spinner = self.ui.spinner("waiting for cluster to become reachable");
        let result = context::bind_context(self.runner, &vars, self.policy).await;
        spinner.finish_and_clear();
        result?;
        run.advance(RunStage::ContextBound);
        self.ui.stage_done("bind-context");

        // Deploy
        self.ui.stage_start(6, "deploy");
        deploy::deploy(self.runner, &workspace, self.config.method, &vars).await?;
        run.advance(RunStage::Deployed);
        self.ui.stage_done("deploy");

        // The target identity is only recorded after everything succeeded,
        // so a failed run never shifts the import-vs-wipe policy.
        TargetRecord::from_vars(&vars).save(&self.config.target_record_path())?;

        let removed = manager.cleanup_old(self.config.retain);
        if removed > 0 {
            tracing::info!(removed, retain = self.config.retain, "workspace retention applied");
        }

        run.advance(RunStage::Done);
        self.ui.finished(&workspace);
        Ok(())
    }
}
