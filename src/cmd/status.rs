//! `foreman status` — render the persisted workflow state.

use anyhow::Result;
use console::style;
use std::path::Path;

use foreman::config::Config;
use foreman::store::ProgressStore;

pub fn cmd_status(workspace_dir: &Path) -> Result<()> {
    let config = Config::new(workspace_dir.to_path_buf(), false)?;
    let store = ProgressStore::new(config.progress_file.clone());

    let Some(record) = store.read() else {
        println!("No workflow in progress");
        return Ok(());
    };

    println!(
        "{} {} (iteration {})",
        style("Phase:").bold(),
        style(record.phase).yellow(),
        record.iteration
    );
    if let Some(ref research) = record.context.research_file {
        println!("{} {research}", style("Research:").bold());
    }
    if let Some(ref branch) = record.context.branch {
        println!("{} {branch}", style("Branch:").bold());
    }
    if let Some(number) = record.context.pr_number {
        match record.context.pr_url.as_deref() {
            Some(url) => println!("{} #{number} ({url})", style("PR:").bold()),
            None => println!("{} #{number}", style("PR:").bold()),
        }
        println!(
            "{} ci={} comments={}",
            style("Attempts:").bold(),
            record.context.ci_attempts,
            record.context.comment_attempts
        );
    }

    if !record.context.plans.is_empty() {
        println!("{}", style("Plans:").bold());
        for (i, plan) in record.context.plans.iter().enumerate() {
            let mark = if plan.completed {
                style("x").green()
            } else {
                style(" ").dim()
            };
            let current = if i == record.context.current_plan_index {
                " <- CURRENT"
            } else {
                ""
            };
            println!("  [{mark}] {}{current}", plan.path);
        }
    }

    if let Some(ref err) = record.context.last_error {
        println!("{} {err}", style("Last error:").red().bold());
    }

    println!(
        "{} {} signal(s) recorded, last update {}",
        style("History:").bold(),
        record.context.signals.len(),
        record.context.updated_at.to_rfc3339()
    );

    Ok(())
}
