//! Workflow context carried across state-machine transitions.
//!
//! The context is created once when a workflow starts, mutated exactly once
//! per applied event, and persisted after every orchestrator iteration. The
//! signal history is append-only: records are never truncated or reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of planned work, tracked in the plan checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUnit {
    /// Path of the plan document, relative to the worktree.
    pub path: String,
    /// External issue id associated with this unit, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    /// Whether the worker has reported this unit complete.
    #[serde(default)]
    pub completed: bool,
}

impl PlanUnit {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            issue: None,
            completed: false,
        }
    }

    /// Conventional plan unit for a 1-based plan number.
    pub fn numbered(number: usize) -> Self {
        Self::new(format!("plans/{number:02}.md"))
    }
}

/// One recorded signal: name, when it was applied, and its auxiliary data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl SignalRecord {
    pub fn new(
        signal: impl Into<String>,
        timestamp: DateTime<Utc>,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            signal: signal.into(),
            timestamp,
            data,
        }
    }
}

/// The mutable record carried across transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Reference to the research artifact the workflow was started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_file: Option<String>,
    /// Workspace path the worker operates in, once setup reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    /// Branch name, once setup reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Ordered plan checklist.
    #[serde(default)]
    pub plans: Vec<PlanUnit>,
    /// Index of the active plan unit; never exceeds `plans.len()`.
    #[serde(default)]
    pub current_plan_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// CI verdicts delivered so far (passed or failed). Monotone within a run.
    #[serde(default)]
    pub ci_attempts: u32,
    /// COMMENTS_PENDING verdicts delivered so far. Monotone within a run.
    #[serde(default)]
    pub comment_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only signal history.
    #[serde(default)]
    pub signals: Vec<SignalRecord>,
}

impl WorkflowContext {
    /// Fresh context for a workflow that has not yet received `START`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            research_file: None,
            worktree: None,
            branch: None,
            plans: Vec::new(),
            current_plan_index: 0,
            pr_number: None,
            pr_url: None,
            ci_attempts: 0,
            comment_attempts: 0,
            last_error: None,
            started_at: now,
            updated_at: now,
            signals: Vec::new(),
        }
    }

    /// The plan unit currently being worked, if the checklist is not exhausted.
    pub fn current_plan(&self) -> Option<&PlanUnit> {
        self.plans.get(self.current_plan_index)
    }

    /// Plan units not yet reported complete.
    pub fn remaining_plans(&self) -> usize {
        self.plans.iter().filter(|p| !p.completed).count()
    }

    /// Append a record to the signal history and stamp `updated_at`.
    pub fn record_signal(
        &mut self,
        signal: impl Into<String>,
        now: DateTime<Utc>,
        data: BTreeMap<String, String>,
    ) {
        self.signals.push(SignalRecord::new(signal, now, data));
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2026-08-07T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx = WorkflowContext::new(now());
        assert!(ctx.research_file.is_none());
        assert!(ctx.plans.is_empty());
        assert_eq!(ctx.current_plan_index, 0);
        assert_eq!(ctx.ci_attempts, 0);
        assert_eq!(ctx.comment_attempts, 0);
        assert!(ctx.signals.is_empty());
        assert_eq!(ctx.started_at, ctx.updated_at);
    }

    #[test]
    fn test_plan_unit_numbered_zero_pads() {
        assert_eq!(PlanUnit::numbered(1).path, "plans/01.md");
        assert_eq!(PlanUnit::numbered(12).path, "plans/12.md");
    }

    #[test]
    fn test_current_plan_and_remaining() {
        let mut ctx = WorkflowContext::new(now());
        ctx.plans = vec![PlanUnit::numbered(1), PlanUnit::numbered(2)];
        assert_eq!(ctx.current_plan().unwrap().path, "plans/01.md");
        assert_eq!(ctx.remaining_plans(), 2);

        ctx.plans[0].completed = true;
        ctx.current_plan_index = 1;
        assert_eq!(ctx.current_plan().unwrap().path, "plans/02.md");
        assert_eq!(ctx.remaining_plans(), 1);

        ctx.current_plan_index = 2;
        assert!(ctx.current_plan().is_none());
    }

    #[test]
    fn test_record_signal_appends_and_stamps() {
        let mut ctx = WorkflowContext::new(now());
        let later: DateTime<Utc> = "2026-08-07T10:05:00Z".parse().unwrap();
        let mut data = BTreeMap::new();
        data.insert("pr_number".to_string(), "123".to_string());

        ctx.record_signal("PR_CREATED", later, data);
        assert_eq!(ctx.signals.len(), 1);
        assert_eq!(ctx.signals[0].signal, "PR_CREATED");
        assert_eq!(ctx.signals[0].data["pr_number"], "123");
        assert_eq!(ctx.updated_at, later);
        assert_eq!(ctx.started_at, now());
    }

    #[test]
    fn test_context_serde_roundtrip() {
        let mut ctx = WorkflowContext::new(now());
        ctx.research_file = Some("docs/research.md".to_string());
        ctx.plans = vec![PlanUnit {
            path: "plans/01.md".to_string(),
            issue: Some("1234".to_string()),
            completed: true,
        }];
        ctx.pr_number = Some(42);
        ctx.record_signal("CI_PASSED", now(), BTreeMap::new());

        let json = serde_json::to_string(&ctx).unwrap();
        let parsed: WorkflowContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx);
    }
}
