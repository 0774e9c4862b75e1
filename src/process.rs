//! Subprocess execution layer.
//!
//! Every external-tool call in the pipeline goes through the
//! [`ProcessRunner`] trait: `(program, args, workdir) -> ToolOutput`.
//! The production implementation streams each output line to the log as the
//! tool runs while capturing the full transcript for error reporting; tests
//! substitute a scripted runner and assert on the recorded invocations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Captured result of one external-tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr concatenated, for error reports.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam for external-tool invocation.
///
/// Errors here mean the tool could not be spawned or its output could not
/// be read; a tool that ran and exited non-zero is a successful `run` call
/// with a non-zero `exit_code`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], workdir: Option<&Path>)
    -> Result<ToolOutput>;
}

/// Production runner on `tokio::process`.
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        workdir: Option<&Path>,
    ) -> Result<ToolOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        tracing::debug!(program, args = args.join(" "), "spawning");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn '{program}'"))?;

        let stdout = child.stdout.take().context("Failed to take stdout")?;
        let stderr = child.stderr.take().context("Failed to take stderr")?;

        // Drain both pipes concurrently so neither side can fill up and
        // deadlock the child.
        let out_task = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = String::new();
            while let Some(line) = lines.next_line().await? {
                tracing::info!(target: "tool", "{program}: {line}");
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok::<String, std::io::Error>(collected)
        };
        let err_task = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Some(line) = lines.next_line().await? {
                tracing::info!(target: "tool", "{program}: {line}");
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok::<String, std::io::Error>(collected)
        };

        let (stdout, stderr) = tokio::join!(out_task, err_task);
        let stdout = stdout.context("Failed to read stdout")?;
        let stderr = stderr.context("Failed to read stderr")?;

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for '{program}'"))?;
        let exit_code = status.code().unwrap_or(-1);

        tracing::debug!(program, exit_code, "completed");

        Ok(ToolOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// One recorded invocation, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl RecordedCall {
    /// `"program arg1 arg2 ..."` form used by sequence assertions.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}
