//! Runtime configuration for foreman.
//!
//! Bridges the optional `foreman.toml` with the runtime needs of the
//! orchestrator: workspace layout under `.foreman/`, worker command
//! resolution, timeouts, and the iteration ceiling.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-phase worker timeout (15 minutes).
const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 900;
/// Default timeout for CI/comment polling phases (45 minutes).
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 2700;
/// Hard ceiling on orchestrator iterations, independent of per-phase guards.
const DEFAULT_MAX_ITERATIONS: u32 = 100;
/// Default worker command.
const DEFAULT_WORKER_CMD: &str = "claude";

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_dir: PathBuf,
    pub state_dir: PathBuf,
    pub progress_file: PathBuf,
    pub log_dir: PathBuf,
    pub notifications_file: PathBuf,
    pub lock_file: PathBuf,
    pub worker_cmd: String,
    pub worker_args: Vec<String>,
    pub worker_timeout: Duration,
    pub poll_timeout: Duration,
    pub max_iterations: u32,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration for a workspace, layering `foreman.toml` (if
    /// present) under environment and CLI overrides.
    pub fn new(workspace_dir: PathBuf, verbose: bool) -> Result<Self> {
        let workspace_dir = workspace_dir
            .canonicalize()
            .context("Failed to resolve workspace directory")?;

        let toml = ForemanToml::load_or_default(&workspace_dir.join("foreman.toml"))?;

        let worker_cmd = std::env::var("FOREMAN_WORKER_CMD")
            .ok()
            .filter(|v| !v.is_empty())
            .or(toml.worker.cmd)
            .unwrap_or_else(|| DEFAULT_WORKER_CMD.to_string());

        let state_dir = workspace_dir.join(".foreman");
        Ok(Self {
            progress_file: state_dir.join("progress.md"),
            log_dir: state_dir.join("logs"),
            notifications_file: state_dir.join("notifications.log"),
            lock_file: state_dir.join("foreman.lock"),
            state_dir,
            workspace_dir,
            worker_cmd,
            worker_args: toml.worker.args,
            worker_timeout: Duration::from_secs(
                toml.worker
                    .timeout_secs
                    .unwrap_or(DEFAULT_WORKER_TIMEOUT_SECS),
            ),
            poll_timeout: Duration::from_secs(
                toml.worker
                    .poll_timeout_secs
                    .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
            ),
            max_iterations: toml
                .limits
                .max_iterations
                .unwrap_or(DEFAULT_MAX_ITERATIONS),
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir).context("Failed to create state directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }
}

/// On-disk `foreman.toml` shape. Every field is optional; missing sections
/// fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
struct ForemanToml {
    #[serde(default)]
    worker: WorkerToml,
    #[serde(default)]
    limits: LimitsToml,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WorkerToml {
    cmd: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    timeout_secs: Option<u64>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LimitsToml {
    max_iterations: Option<u32>,
}

impl ForemanToml {
    fn load_or_default(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_layout_under_state_dir() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.state_dir, root.join(".foreman"));
        assert_eq!(config.progress_file, root.join(".foreman/progress.md"));
        assert_eq!(config.log_dir, root.join(".foreman/logs"));
        assert_eq!(config.lock_file, root.join(".foreman/foreman.lock"));
    }

    #[test]
    fn test_config_defaults_without_toml() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(config.worker_cmd, "claude");
        assert!(config.worker_args.is_empty());
        assert_eq!(config.worker_timeout, Duration::from_secs(900));
        assert_eq!(config.poll_timeout, Duration::from_secs(2700));
        assert_eq!(config.max_iterations, 100);
    }

    #[test]
    fn test_config_reads_foreman_toml() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("foreman.toml"),
            r#"
[worker]
cmd = "my-worker"
args = ["--quiet"]
timeout_secs = 60
poll_timeout_secs = 120

[limits]
max_iterations = 10
"#,
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(config.worker_cmd, "my-worker");
        assert_eq!(config.worker_args, vec!["--quiet".to_string()]);
        assert_eq!(config.worker_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_timeout, Duration::from_secs(120));
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn test_config_partial_toml_keeps_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("foreman.toml"), "[worker]\ncmd = \"w\"\n").unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(config.worker_cmd, "w");
        assert_eq!(config.max_iterations, 100);
    }

    #[test]
    fn test_config_invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("foreman.toml"), "not = [valid").unwrap();
        let err = Config::new(dir.path().to_path_buf(), false).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_ensure_directories_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        config.ensure_directories().unwrap();
        assert!(config.log_dir.exists());
    }
}
