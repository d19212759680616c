//! Advisory workspace lock.
//!
//! Exactly one orchestrator may run against a workspace at a time; the
//! progress file is the only shared mutable resource. The lock is an
//! exclusive `fs2` file lock held for the guard's lifetime, so a second
//! invocation fails fast instead of racing the store.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::OrchestratorError;

#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the lock, failing immediately if another process holds it.
    pub fn acquire(path: &Path) -> Result<Self, OrchestratorError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| OrchestratorError::Other(anyhow::Error::new(e).context(format!(
                "Failed to open lock file {}",
                path.display()
            ))))?;

        file.try_lock_exclusive()
            .map_err(|_| OrchestratorError::WorkspaceLocked {
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        // Released on close anyway; unlock explicitly for clarity.
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreman.lock");

        let lock = WorkspaceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        drop(lock);

        // Reacquirable after release.
        let _again = WorkspaceLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreman.lock");

        let _held = WorkspaceLock::acquire(&path).unwrap();
        let err = WorkspaceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkspaceLocked { .. }));
        assert!(err.to_string().contains("lock"));
    }
}
