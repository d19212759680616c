//! `foreman reset` — clear the persisted workflow state.

use anyhow::Result;
use console::style;
use std::path::Path;

use foreman::config::Config;
use foreman::store::ProgressStore;

pub fn cmd_reset(workspace_dir: &Path, force: bool) -> Result<()> {
    let config = Config::new(workspace_dir.to_path_buf(), false)?;
    let store = ProgressStore::new(config.progress_file.clone());

    if !store.exists() {
        println!("Nothing to reset");
        return Ok(());
    }

    if !force {
        anyhow::bail!(
            "A workflow is recorded at {}; pass --force to discard it",
            config.progress_file.display()
        );
    }

    store.reset()?;
    println!("{} workflow state cleared", style("Reset:").bold());
    Ok(())
}
