use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::deploy::Method;

/// Runtime configuration for one orchestrator run.
///
/// Resolves the repo root and every path derived from it once, at startup;
/// all stages receive this struct instead of consulting the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository root holding the source trees and the run workspaces.
    pub repo_root: PathBuf,
    /// Terraform definitions copied into each workspace.
    pub terraform_src: PathBuf,
    /// Ansible playbooks and manifests copied into each workspace.
    pub ansible_src: PathBuf,
    /// Variables file supplying project, region, zone, cluster name, public IP.
    pub vars_file: PathBuf,
    /// How many timestamped workspaces to keep after a run.
    pub retain: usize,
    pub method: Method,
    pub verbose: bool,
}

impl Config {
    pub fn new(
        repo_root: PathBuf,
        vars_file: Option<PathBuf>,
        method: Method,
        retain: usize,
        verbose: bool,
    ) -> Result<Self> {
        let repo_root = repo_root
            .canonicalize()
            .context("Failed to resolve repository root")?;

        let terraform_src = repo_root.join("terraform");
        let ansible_src = repo_root.join("ansible");
        let vars_file = match vars_file {
            Some(path) => path
                .canonicalize()
                .context("Failed to resolve variables file path")?,
            None => terraform_src.join("variables.tfvars"),
        };

        Ok(Self {
            repo_root,
            terraform_src,
            ansible_src,
            vars_file,
            retain,
            method,
            verbose,
        })
    }

    /// Directory for orchestrator bookkeeping (the target record).
    pub fn state_dir(&self) -> PathBuf {
        self.repo_root.join(".jenkinsup")
    }

    /// Recorded identity of the last successfully deployed target.
    pub fn target_record_path(&self) -> PathBuf {
        self.state_dir().join("last-target.json")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.state_dir())
            .context("Failed to create orchestrator state directory")?;
        Ok(())
    }
}
