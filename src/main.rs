use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

use jenkinsup::config::Config;
use jenkinsup::deploy::Method;
use jenkinsup::errors::RunError;
use jenkinsup::orchestrator::Orchestrator;
use jenkinsup::process::SystemRunner;

#[derive(Parser)]
#[command(name = "jenkinsup")]
#[command(version, about = "Provision a GKE cluster and deploy Jenkins onto it")]
struct Cli {
    /// Deployment method: apply raw manifests or install the Helm chart
    #[arg(long, value_enum, default_value_t = Method::Kubectl)]
    method: Method,

    /// Repository root containing the terraform/ and ansible/ source trees
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Variables file (defaults to <project-dir>/terraform/variables.tfvars)
    #[arg(long)]
    vars_file: Option<PathBuf>,

    /// Number of timestamped run workspaces to keep
    #[arg(long, default_value_t = 5)]
    retain: usize,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{} stage '{}' failed: {e}",
                style("error:").red().bold(),
                e.stage_name()
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let config = Config::new(
        cli.project_dir,
        cli.vars_file,
        cli.method,
        cli.retain,
        cli.verbose,
    )?;

    let runner = SystemRunner::new();
    let orchestrator = Orchestrator::new(config, &runner);
    orchestrator.run().await?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
