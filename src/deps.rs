//! Prerequisite tooling checks and auto-install.
//!
//! Probes each required CLI with a `--version` invocation; missing tools
//! are installed through the host package manager (apt-get for the
//! HashiCorp/Kubernetes CLIs, pip3 for Ansible and its kubernetes module).
//! gcloud is the exception: its installer is interactive and account-bound,
//! so a missing gcloud is fatal with an install hint. Re-running with all
//! tools present performs only probes.

use crate::deploy::Method;
use crate::errors::DependencyError;
use crate::process::ProcessRunner;

/// How a missing tool gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Install {
    Apt { package: &'static str },
    Pip { packages: &'static [&'static str] },
    Snap { package: &'static str },
    /// Never auto-installed; the hint goes into the error.
    Manual { hint: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct Tool {
    pub name: &'static str,
    pub install: Install,
}

/// Outcome of one probe/install pass, discarded after reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: &'static str,
    pub was_present: bool,
    pub installed: bool,
}

/// The tool set a run needs. helm is only required for chart-install runs.
pub fn required_tools(method: Method) -> Vec<Tool> {
    let mut tools = vec![
        Tool {
            name: "terraform",
            install: Install::Apt {
                package: "terraform",
            },
        },
        Tool {
            name: "gcloud",
            install: Install::Manual {
                hint: "https://cloud.google.com/sdk/docs/install",
            },
        },
        Tool {
            name: "kubectl",
            install: Install::Apt { package: "kubectl" },
        },
        Tool {
            name: "ansible-playbook",
            install: Install::Pip {
                packages: &["ansible", "kubernetes"],
            },
        },
    ];
    if method == Method::Helm {
        tools.push(Tool {
            name: "helm",
            install: Install::Snap { package: "helm" },
        });
    }
    tools
}

/// Probe every tool and install the missing ones.
pub async fn ensure_tools(
    runner: &dyn ProcessRunner,
    tools: &[Tool],
) -> Result<Vec<ToolStatus>, DependencyError> {
    let mut statuses = Vec::with_capacity(tools.len());

    for tool in tools {
        let present = probe(runner, tool.name).await;
        if present {
            tracing::debug!(tool = tool.name, "present");
            statuses.push(ToolStatus {
                name: tool.name,
                was_present: true,
                installed: false,
            });
            continue;
        }

        tracing::info!(tool = tool.name, "missing, attempting install");
        install(runner, tool).await?;

        if !probe(runner, tool.name).await {
            return Err(DependencyError::InstallFailed {
                tool: tool.name.to_string(),
                installer: installer_name(&tool.install).to_string(),
                output: "tool still missing after install".to_string(),
            });
        }
        statuses.push(ToolStatus {
            name: tool.name,
            was_present: false,
            installed: true,
        });
    }

    Ok(statuses)
}

/// A tool is present when its version probe runs and exits zero. A spawn
/// failure (command not found) counts as missing, not as an error.
async fn probe(runner: &dyn ProcessRunner, name: &str) -> bool {
    match runner.run(name, &["--version"], None).await {
        Ok(out) => out.success(),
        Err(_) => false,
    }
}

fn installer_name(install: &Install) -> &'static str {
    match install {
        Install::Apt { .. } => "apt-get",
        Install::Pip { .. } => "pip3",
        Install::Snap { .. } => "snap",
        Install::Manual { .. } => "manual",
    }
}

async fn install(runner: &dyn ProcessRunner, tool: &Tool) -> Result<(), DependencyError> {
    let (program, args): (&str, Vec<&str>) = match tool.install {
        Install::Apt { package } => ("sudo", vec!["apt-get", "install", "-y", package]),
        Install::Pip { packages } => {
            let mut args = vec!["install"];
            args.extend_from_slice(packages);
            ("pip3", args)
        }
        Install::Snap { package } => ("sudo", vec!["snap", "install", package, "--classic"]),
        Install::Manual { hint } => {
            return Err(DependencyError::NotInstallable {
                tool: tool.name.to_string(),
                hint: hint.to_string(),
            });
        }
    };

    let output = runner
        .run(program, &args, None)
        .await
        .map_err(|e| DependencyError::InstallFailed {
            tool: tool.name.to_string(),
            installer: installer_name(&tool.install).to_string(),
            output: format!("{e:#}"),
        })?;

    if !output.success() {
        return Err(DependencyError::InstallFailed {
            tool: tool.name.to_string(),
            installer: installer_name(&tool.install).to_string(),
            output: output.combined(),
        });
    }
    Ok(())
}
