//! Typed error hierarchy for the foreman orchestrator.
//!
//! Two top-level enums cover the two subsystems:
//! - `WorkerError` — external worker invocation failures
//! - `OrchestratorError` — engine failures around the run loop

use std::path::PathBuf;
use thiserror::Error;

/// Errors from invoking the external worker subprocess.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed to spawn worker process '{cmd}': {source}")]
    SpawnFailed {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to deliver prompt to worker stdin: {0}")]
    PromptDeliveryFailed(#[source] std::io::Error),

    #[error("Worker timed out after {secs}s and was terminated")]
    TimedOut { secs: u64 },

    #[error("Worker I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the orchestrator engine itself.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No workflow in progress (no progress file at {path})")]
    NoWorkflowInProgress { path: PathBuf },

    #[error(
        "A workflow is already recorded at {path}; resume it with 'foreman resume' \
         or clear it with 'foreman reset'"
    )]
    WorkflowAlreadyExists { path: PathBuf },

    #[error("Another foreman instance holds the workspace lock at {path}")]
    WorkspaceLocked { path: PathBuf },

    #[error("Failed to persist progress to {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Run cancelled by operator; progress persisted for resume")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_error_spawn_failed_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "claude not found");
        let err = WorkerError::SpawnFailed {
            cmd: "claude".to_string(),
            source: io_err,
        };
        match &err {
            WorkerError::SpawnFailed { cmd, source } => {
                assert_eq!(cmd, "claude");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected SpawnFailed variant"),
        }
        assert!(err.to_string().contains("claude"));
    }

    #[test]
    fn worker_error_timed_out_carries_seconds() {
        let err = WorkerError::TimedOut { secs: 900 };
        assert!(err.to_string().contains("900"));
        assert!(err.to_string().contains("terminated"));
    }

    #[test]
    fn orchestrator_error_no_workflow_mentions_path() {
        let err = OrchestratorError::NoWorkflowInProgress {
            path: PathBuf::from("/ws/.foreman/progress.md"),
        };
        assert!(err.to_string().contains("No workflow in progress"));
        assert!(err.to_string().contains("progress.md"));
    }

    #[test]
    fn orchestrator_error_cancelled_is_matchable() {
        let err = OrchestratorError::Cancelled;
        assert!(matches!(err, OrchestratorError::Cancelled));
    }

    #[test]
    fn orchestrator_error_converts_from_anyhow() {
        let err: OrchestratorError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, OrchestratorError::Other(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&WorkerError::TimedOut { secs: 1 });
        assert_std_error(&OrchestratorError::Cancelled);
    }
}
