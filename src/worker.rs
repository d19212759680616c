//! External worker invocation.
//!
//! The worker is an opaque subprocess: it receives a prompt on stdin and
//! produces unstructured text. The [`Executor`] trait keeps the concrete
//! mechanism swappable and mockable; the signal parser is the only place
//! that imposes structure on the output.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::errors::WorkerError;

/// Options for one invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

/// Raw result of one invocation: untrusted plain text plus the exit code.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub text: String,
    pub exit_code: i32,
}

/// Narrow capability boundary around the external worker.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<WorkerOutput, WorkerError>;
}

/// Spawns the configured worker command once per invocation. Each call gets
/// a fresh process with no memory of prior invocations.
pub struct SubprocessExecutor {
    cmd: String,
    args: Vec<String>,
}

impl SubprocessExecutor {
    pub fn new(cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args,
        }
    }
}

#[async_trait]
impl Executor for SubprocessExecutor {
    async fn invoke(&self, prompt: &str, opts: &InvokeOptions) -> Result<WorkerOutput, WorkerError> {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // If the invocation future is dropped (cancellation), the
            // subprocess must be terminated, not abandoned.
            .kill_on_drop(true);
        if let Some(ref dir) = opts.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(cmd = %self.cmd, timeout_secs = opts.timeout.as_secs(), "spawning worker");

        let mut child = cmd.spawn().map_err(|source| WorkerError::SpawnFailed {
            cmd: self.cmd.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(WorkerError::PromptDeliveryFailed)?;
            stdin
                .shutdown()
                .await
                .map_err(WorkerError::PromptDeliveryFailed)?;
        }

        // Drain both pipes concurrently so a chatty worker cannot deadlock
        // on a full buffer while we wait for exit.
        let mut stdout = child.stdout.take().ok_or_else(|| {
            WorkerError::Io(std::io::Error::other("worker stdout unavailable"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            WorkerError::Io(std::io::Error::other("worker stderr unavailable"))
        })?;

        let out_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf).await;
            buf
        });
        let err_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let status = match tokio::time::timeout(opts.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                out_task.abort();
                err_task.abort();
                return Err(WorkerError::TimedOut {
                    secs: opts.timeout.as_secs(),
                });
            }
        };

        let stdout_text = out_task.await.unwrap_or_default();
        let stderr_text = err_task.await.unwrap_or_default();

        let mut text = stdout_text;
        if !stderr_text.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr_text);
        }

        let exit_code = status.code().unwrap_or(-1);
        tracing::debug!(exit_code, output_chars = text.len(), "worker finished");

        Ok(WorkerOutput { text, exit_code })
    }
}
