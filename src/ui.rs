//! Terminal reporting for the run pipeline.
//!
//! One line per stage transition plus a spinner while a long-running
//! external tool holds the terminal. Structured events go to `tracing`;
//! this module is only the human-facing rendering.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct RunUi {
    total_stages: usize,
}

impl RunUi {
    pub fn new(total_stages: usize) -> Self {
        Self { total_stages }
    }

    pub fn stage_start(&self, index: usize, name: &str) {
        println!(
            "{} {}",
            style(format!("[{}/{}]", index, self.total_stages)).bold().dim(),
            style(name).cyan()
        );
    }

    pub fn stage_done(&self, name: &str) {
        println!("      {} {}", style("✓").green(), name);
    }

    pub fn stage_failed(&self, name: &str) {
        eprintln!("      {} {}", style("✗").red(), name);
    }

    /// Spinner shown while a blocking external tool runs. Returned bar must
    /// be finished by the caller.
    pub fn spinner(&self, message: &str) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("      {spinner} {msg}")
                .expect("spinner template is a valid static string"),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    pub fn finished(&self, workspace: &std::path::Path) {
        println!(
            "\n{} Jenkins deployed. Workspace: {}",
            style("done:").green().bold(),
            workspace.display()
        );
    }
}
