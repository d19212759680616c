//! Append-only notification sink.
//!
//! The orchestrator reports noteworthy events (phase changes, failures,
//! stuck verdicts) through an injected sink so nothing in the engine holds
//! shared mutable global state. The file-backed sink appends one
//! timestamped line per event.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub trait NotificationSink: Send + Sync {
    fn append(&self, message: &str) -> Result<()>;
}

/// Appends `<rfc3339> <message>` lines to a well-known log file.
pub struct FileNotificationSink {
    path: PathBuf,
}

impl FileNotificationSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl NotificationSink for FileNotificationSink {
    fn append(&self, message: &str) -> Result<()> {
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), message);
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open notification log")?
            .write_all(line.as_bytes())
            .context("Failed to append notification")?;
        Ok(())
    }
}

/// Discards everything; used in tests and library embedding.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn append(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notifications.log");
        let sink = FileNotificationSink::new(path.clone());

        sink.append("phase SETUP -> PLANNING").unwrap();
        sink.append("phase PLANNING -> IMPLEMENTING").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("phase SETUP -> PLANNING"));
        assert!(lines[1].ends_with("phase PLANNING -> IMPLEMENTING"));
    }

    #[test]
    fn test_file_sink_never_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notifications.log");

        FileNotificationSink::new(path.clone())
            .append("first run")
            .unwrap();
        // A second sink against the same file keeps the history.
        FileNotificationSink::new(path.clone())
            .append("second run")
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first run"));
        assert!(content.contains("second run"));
    }

    #[test]
    fn test_null_sink_is_silent() {
        NullSink.append("anything").unwrap();
    }
}
