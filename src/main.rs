use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

/// Exit code for a run cancelled mid-phase (safely resumable), distinct
/// from a terminal failure.
const EXIT_CANCELLED: u8 = 2;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(version, about = "Delivery-pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace directory the workflow runs against.
    #[arg(long, global = true)]
    pub workspace_dir: Option<PathBuf>,

    /// Worker command to invoke (overrides foreman.toml and FOREMAN_WORKER_CMD).
    #[arg(long, global = true)]
    pub worker_cmd: Option<String>,

    /// Hard iteration ceiling (overrides foreman.toml).
    #[arg(long, global = true)]
    pub max_iterations: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a fresh workflow from a research artifact reference
    Run {
        /// Reference to the research artifact (path or identifier)
        input: String,
    },
    /// Continue the workflow recorded in the progress file
    Resume,
    /// Show the persisted workflow state
    Status,
    /// Clear the persisted workflow state
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(&cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<ExitCode> {
    let workspace_dir = match cli.workspace_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { input } => cmd::cmd_run(cli, workspace_dir, Some(input.as_str())).await,
        Commands::Resume => cmd::cmd_run(cli, workspace_dir, None).await,
        Commands::Status => {
            cmd::cmd_status(&workspace_dir)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reset { force } => {
            cmd::cmd_reset(&workspace_dir, *force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
