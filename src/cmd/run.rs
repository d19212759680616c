//! `foreman run <input>` and `foreman resume` — drive the workflow.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use foreman::config::Config;
use foreman::errors::OrchestratorError;
use foreman::lock::WorkspaceLock;
use foreman::notify::{FileNotificationSink, NotificationSink};
use foreman::orchestrator::{Orchestrator, WorkflowResult};
use foreman::ui::OrchestratorUi;
use foreman::worker::SubprocessExecutor;

use super::super::{Cli, EXIT_CANCELLED};

/// Shared driver for `run` and `resume`; `input` is `Some` for a fresh run.
pub async fn cmd_run(
    cli: &Cli,
    workspace_dir: PathBuf,
    input: Option<&str>,
) -> Result<ExitCode> {
    let mut config = Config::new(workspace_dir, cli.verbose)?;
    if let Some(ref cmd) = cli.worker_cmd {
        config.worker_cmd = cmd.clone();
    }
    if let Some(max) = cli.max_iterations {
        config.max_iterations = max;
    }
    config.ensure_directories()?;

    let _log_guard = init_tracing(&config)?;

    // Fail fast if another foreman instance owns this workspace; the lock
    // is held until the process exits.
    let _lock = WorkspaceLock::acquire(&config.lock_file)?;

    let executor = SubprocessExecutor::new(config.worker_cmd.clone(), config.worker_args.clone());
    let sink = Box::new(FileNotificationSink::new(config.notifications_file.clone()));
    let ui = Arc::new(OrchestratorUi::new(cli.verbose));

    // Every process gets its own id so interleaved histories in the
    // notification log can be told apart.
    let run_id = uuid::Uuid::new_v4();
    sink.append(&format!("--- foreman run {run_id} ---"))?;
    tracing::info!(%run_id, worker_cmd = %config.worker_cmd, "starting");

    let mut orchestrator = Orchestrator::new(config, executor, sink).with_ui(ui);

    let outcome = match input {
        Some(input) => orchestrator.run(input).await,
        None => orchestrator.resume().await,
    };

    match outcome {
        Ok(result) => {
            report(&result);
            if result.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Err(OrchestratorError::Cancelled) => {
            println!(
                "{} cancelled mid-phase; run 'foreman resume' to continue",
                console::style("Stopped:").yellow().bold()
            );
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(err) => Err(err.into()),
    }
}

/// Final report: outcome, and on failure the phase, last error, and the
/// full signal history so an operator can diagnose without re-running.
fn report(result: &WorkflowResult) {
    println!();
    if result.success {
        println!(
            "{} workflow completed in {} iteration(s)",
            console::style("Done:").green().bold(),
            result.iterations
        );
        if let Some(number) = result.final_context.pr_number {
            match result.final_context.pr_url.as_deref() {
                Some(url) => println!("  PR #{number}: {url}"),
                None => println!("  PR #{number}"),
            }
        }
        return;
    }

    println!(
        "{} workflow ended in phase {} after {} iteration(s)",
        console::style("Failed:").red().bold(),
        result.final_phase,
        result.iterations
    );
    if let Some(ref err) = result.final_context.last_error {
        println!("  last error: {err}");
    }
    if !result.final_context.signals.is_empty() {
        println!("  signal history:");
        for record in &result.final_context.signals {
            println!("    {} {}", record.timestamp.to_rfc3339(), record.signal);
        }
    }
}

/// Stderr logging filtered by `FOREMAN_LOG`, plus a per-workspace log file.
/// The returned guard must stay alive for the file writer to flush.
fn init_tracing(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("foreman.log"))
        .context("Failed to open log file")?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_env("FOREMAN_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("foreman=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()
        .ok();

    Ok(guard)
}
