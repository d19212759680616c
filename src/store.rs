//! Durable progress checkpointing.
//!
//! The store writes one human-readable document per workspace
//! (`.foreman/progress.md`) and reads it back best-effort. Every write is a
//! full-document rewrite through a temp file + rename, so a concurrently
//! resuming process never sees a torn file. The reader tolerates missing
//! optional fields and malformed lines — formatting drift across versions
//! must never block a resume.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{PlanUnit, SignalRecord, WorkflowContext};
use crate::phase::Phase;

/// The persisted shape: the full context plus the literal phase and the
/// orchestrator iteration counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub phase: Phase,
    pub iteration: u32,
    pub context: WorkflowContext,
}

pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist the full document, replacing any previous checkpoint.
    pub fn write(&self, context: &WorkflowContext, phase: Phase, iteration: u32) -> Result<()> {
        let doc = render(context, phase, iteration);
        let dir = self
            .path
            .parent()
            .context("progress file has no parent directory")?;
        let tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary progress file")?;
        fs::write(tmp.path(), doc).context("Failed to write progress document")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Best-effort read of the checkpoint. `None` when the file is missing
    /// or carries no usable status block; never an error for malformed
    /// content.
    pub fn read(&self) -> Option<ProgressRecord> {
        let content = fs::read_to_string(&self.path).ok()?;
        parse(&content)
    }

    /// Remove the checkpoint, if present.
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove progress file")?;
        }
        Ok(())
    }
}

fn render(ctx: &WorkflowContext, phase: Phase, iteration: u32) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "# Foreman Progress");
    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Status");
    let _ = writeln!(doc, "phase: {}", phase);
    let _ = writeln!(doc, "iteration: {}", iteration);
    let _ = writeln!(doc, "started_at: {}", ctx.started_at.to_rfc3339());
    let _ = writeln!(doc, "updated_at: {}", ctx.updated_at.to_rfc3339());
    if let Some(ref research) = ctx.research_file {
        let _ = writeln!(doc, "research_file: {research}");
    }
    if let Some(ref worktree) = ctx.worktree {
        let _ = writeln!(doc, "worktree: {worktree}");
    }
    if let Some(ref branch) = ctx.branch {
        let _ = writeln!(doc, "branch: {branch}");
    }
    if let Some(ref err) = ctx.last_error {
        let _ = writeln!(doc, "last_error: {}", single_line(err));
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Plans");
    if ctx.plans.is_empty() {
        let _ = writeln!(doc, "(none)");
    }
    for (i, plan) in ctx.plans.iter().enumerate() {
        let mark = if plan.completed { "x" } else { " " };
        let mut line = format!("- [{mark}] {}", plan.path);
        if let Some(ref issue) = plan.issue {
            let _ = write!(line, " (#{issue})");
        }
        if i == ctx.current_plan_index {
            line.push_str(" <- CURRENT");
        }
        let _ = writeln!(doc, "{line}");
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Pull Request");
    if let Some(number) = ctx.pr_number {
        let _ = writeln!(doc, "pr_number: {number}");
    }
    if let Some(ref url) = ctx.pr_url {
        let _ = writeln!(doc, "pr_url: {url}");
    }
    let _ = writeln!(doc, "ci_status: {}", ci_status_token(phase));
    let _ = writeln!(doc, "ci_attempts: {}", ctx.ci_attempts);
    let _ = writeln!(doc, "comment_attempts: {}", ctx.comment_attempts);

    let _ = writeln!(doc);
    let _ = writeln!(doc, "## Signals");
    for record in &ctx.signals {
        let mut line = format!("- {} {}", record.timestamp.to_rfc3339(), record.signal);
        for (key, value) in &record.data {
            let _ = write!(line, " {key}={}", single_line(value));
        }
        let _ = writeln!(doc, "{line}");
    }

    doc
}

/// Informational CI token derived from the phase; not read back.
fn ci_status_token(phase: Phase) -> &'static str {
    match phase {
        Phase::CiVerify => "pending",
        Phase::CiFix => "failing",
        Phase::CommentVerify | Phase::CommentFix | Phase::Completed => "passed",
        _ => "-",
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn parse(content: &str) -> Option<ProgressRecord> {
    let mut section = "";
    let mut status: BTreeMap<String, String> = BTreeMap::new();
    let mut plans: Vec<PlanUnit> = Vec::new();
    let mut current_plan_index: Option<usize> = None;
    let mut signals: Vec<SignalRecord> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            section = match heading {
                "Status" => "status",
                "Plans" => "plans",
                "Pull Request" => "pr",
                "Signals" => "signals",
                _ => "",
            };
            continue;
        }
        match section {
            "status" | "pr" => {
                if let Some((key, value)) = trimmed.split_once(':') {
                    let value = value.trim();
                    if !value.is_empty() {
                        status.insert(key.trim().to_string(), value.to_string());
                    }
                }
            }
            "plans" => {
                if let Some(plan) = parse_plan_line(trimmed) {
                    if plan.1 {
                        current_plan_index = Some(plans.len());
                    }
                    plans.push(plan.0);
                }
            }
            "signals" => {
                if let Some(record) = parse_signal_line(trimmed) {
                    signals.push(record);
                }
            }
            _ => {}
        }
    }

    // Without a phase token there is nothing to resume from.
    let phase: Phase = status.get("phase")?.parse().ok()?;
    let iteration = status
        .get("iteration")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let started_at = parse_timestamp(status.get("started_at"));
    let updated_at = parse_timestamp(status.get("updated_at"));

    let plan_count = plans.len();
    let context = WorkflowContext {
        research_file: status.get("research_file").cloned(),
        worktree: status.get("worktree").cloned(),
        branch: status.get("branch").cloned(),
        plans,
        current_plan_index: current_plan_index.unwrap_or(plan_count),
        pr_number: status.get("pr_number").and_then(|v| v.parse().ok()),
        pr_url: status.get("pr_url").cloned(),
        ci_attempts: status
            .get("ci_attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        comment_attempts: status
            .get("comment_attempts")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        last_error: status.get("last_error").cloned(),
        started_at,
        updated_at,
        signals,
    };

    Some(ProgressRecord {
        phase,
        iteration,
        context,
    })
}

fn parse_timestamp(value: Option<&String>) -> DateTime<Utc> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Parse one checklist line; the bool is the `<- CURRENT` marker.
fn parse_plan_line(line: &str) -> Option<(PlanUnit, bool)> {
    let rest = line.strip_prefix("- [")?;
    let completed = rest.starts_with('x') || rest.starts_with('X');
    let rest = rest.get(1..)?.strip_prefix("] ")?;

    let current = rest.ends_with("<- CURRENT");
    let rest = rest.trim_end_matches("<- CURRENT").trim_end();

    let (path, issue) = match rest.rfind(" (#") {
        Some(pos) if rest.ends_with(')') => {
            let issue = rest[pos + 3..rest.len() - 1].to_string();
            (rest[..pos].trim_end().to_string(), Some(issue))
        }
        _ => (rest.to_string(), None),
    };
    if path.is_empty() {
        return None;
    }

    Some((
        PlanUnit {
            path,
            issue,
            completed,
        },
        current,
    ))
}

fn parse_signal_line(line: &str) -> Option<SignalRecord> {
    let rest = line.strip_prefix("- ")?;
    let mut parts = rest.split_whitespace();
    let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
        .ok()?
        .with_timezone(&Utc);
    let signal = parts.next()?.to_string();
    let mut data = BTreeMap::new();
    for token in parts {
        if let Some((key, value)) = token.split_once('=') {
            data.insert(key.to_string(), value.to_string());
        }
    }
    Some(SignalRecord {
        signal,
        timestamp,
        data,
    })
}
