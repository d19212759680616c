//! The phase state machine: a pure transition function over
//! `(Phase, Event, WorkflowContext)`.
//!
//! `transition` performs no I/O and touches no clocks; the caller supplies
//! the timestamp so replays are deterministic. Event/phase combinations
//! outside the transition table produce a [`Rejection`] value, which the
//! orchestrator treats as a logged no-op — a worker repeating or misfiring
//! a signal must not corrupt state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::{PlanUnit, WorkflowContext};
use crate::phase::Phase;

/// CI verdicts allowed before the workflow is declared failed.
pub const MAX_CI_ATTEMPTS: u32 = 5;
/// COMMENTS_PENDING verdicts allowed before the workflow is declared failed.
pub const MAX_COMMENT_ATTEMPTS: u32 = 10;

/// One parsed signal, ready to be applied to the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// Control event: begin a workflow from the given research artifact.
    Start { input: String },
    SetupComplete {
        worktree: Option<String>,
        branch: Option<String>,
    },
    PlanningComplete { plan_count: usize },
    PlanComplete { plan_number: usize },
    ImplementationComplete,
    PrCreated {
        number: Option<u64>,
        url: Option<String>,
    },
    CiPassed,
    CiFailed { reason: String },
    CiFixPushed,
    CommentsResolved,
    CommentsPending { count: usize },
    CommentFixPushed,
    /// Control event: abort the workflow with a reason.
    Fail { reason: String },
}

impl Event {
    /// Signal-protocol name, as recorded in the signal history.
    pub fn signal_name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "START",
            Event::SetupComplete { .. } => "SETUP_COMPLETE",
            Event::PlanningComplete { .. } => "PLANNING_COMPLETE",
            Event::PlanComplete { .. } => "PLAN_COMPLETE",
            Event::ImplementationComplete => "IMPLEMENTATION_COMPLETE",
            Event::PrCreated { .. } => "PR_CREATED",
            Event::CiPassed => "CI_PASSED",
            Event::CiFailed { .. } => "CI_FAILED",
            Event::CiFixPushed => "CI_FIX_PUSHED",
            Event::CommentsResolved => "COMMENTS_RESOLVED",
            Event::CommentsPending { .. } => "COMMENTS_PENDING",
            Event::CommentFixPushed => "COMMENT_FIX_PUSHED",
            Event::Fail { .. } => "FAIL",
        }
    }

    /// Auxiliary data recorded alongside the signal name in the history.
    pub fn data_map(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        match self {
            Event::SetupComplete { worktree, branch } => {
                if let Some(w) = worktree {
                    data.insert("worktree_path".to_string(), w.clone());
                }
                if let Some(b) = branch {
                    data.insert("branch".to_string(), b.clone());
                }
            }
            Event::PlanningComplete { plan_count } => {
                data.insert("plan_count".to_string(), plan_count.to_string());
            }
            Event::PlanComplete { plan_number } => {
                data.insert("plan_number".to_string(), plan_number.to_string());
            }
            Event::PrCreated { number, url } => {
                if let Some(n) = number {
                    data.insert("pr_number".to_string(), n.to_string());
                }
                if let Some(u) = url {
                    data.insert("pr_url".to_string(), u.clone());
                }
            }
            Event::CiFailed { reason } => {
                data.insert("error".to_string(), reason.clone());
            }
            Event::CommentsPending { count } => {
                data.insert("comment_count".to_string(), count.to_string());
            }
            Event::Fail { reason } => {
                data.insert("error".to_string(), reason.clone());
            }
            _ => {}
        }
        data
    }
}

/// A successfully applied transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub phase: Phase,
    pub context: WorkflowContext,
}

/// An event the current phase does not accept. Not an error: the
/// orchestrator logs it and retries the phase on the next iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub phase: Phase,
    pub signal: &'static str,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "signal {} not accepted in phase {}", self.signal, self.phase)
    }
}

/// Apply `event` to `(phase, ctx)`, returning the next phase and the fully
/// updated context, or a [`Rejection`] when the pair is outside the table.
///
/// Every applied transition appends a signal record, except `Start`, which
/// is implicit setup rather than a worker-emitted signal and is kept out of
/// the visible history.
pub fn transition(
    phase: Phase,
    event: &Event,
    ctx: &WorkflowContext,
    now: DateTime<Utc>,
) -> Result<Transition, Rejection> {
    let reject = || {
        Err(Rejection {
            phase,
            signal: event.signal_name(),
        })
    };

    // FAIL is accepted from any non-terminal phase.
    if let Event::Fail { reason } = event {
        if phase.is_terminal() {
            return reject();
        }
        let mut next = ctx.clone();
        next.last_error = Some(reason.clone());
        next.record_signal(event.signal_name(), now, event.data_map());
        return Ok(Transition {
            phase: Phase::Failed,
            context: next,
        });
    }

    let mut next = ctx.clone();

    let target = match (phase, event) {
        (Phase::Idle, Event::Start { input }) => {
            next.research_file = Some(input.clone());
            next.started_at = now;
            next.updated_at = now;
            // START is excluded from the visible signal history.
            return Ok(Transition {
                phase: Phase::Setup,
                context: next,
            });
        }
        (Phase::Setup, Event::SetupComplete { worktree, branch }) => {
            if worktree.is_some() {
                next.worktree = worktree.clone();
            }
            if branch.is_some() {
                next.branch = branch.clone();
            }
            Phase::Planning
        }
        (Phase::Planning, Event::PlanningComplete { plan_count }) => {
            next.plans = (1..=*plan_count).map(PlanUnit::numbered).collect();
            next.current_plan_index = 0;
            Phase::Implementing
        }
        (Phase::Implementing, Event::PlanComplete { plan_number }) => {
            // Plan numbers are 1-based; anything outside the checklist is a
            // stray signal.
            if *plan_number == 0 || *plan_number > next.plans.len() {
                return reject();
            }
            next.plans[*plan_number - 1].completed = true;
            next.current_plan_index = (next.current_plan_index + 1).min(next.plans.len());
            Phase::Implementing
        }
        (Phase::Implementing, Event::ImplementationComplete) => Phase::Submitting,
        (Phase::Submitting, Event::PrCreated { number, url }) => {
            next.pr_number = *number;
            next.pr_url = url.clone();
            Phase::CiVerify
        }
        (Phase::CiVerify, Event::CiPassed) => {
            next.ci_attempts += 1;
            Phase::CommentVerify
        }
        (Phase::CiVerify, Event::CiFailed { reason }) => {
            next.ci_attempts += 1;
            if next.ci_attempts >= MAX_CI_ATTEMPTS {
                next.last_error = Some(format!(
                    "CI attempt ceiling reached ({MAX_CI_ATTEMPTS} attempts): {reason}"
                ));
                Phase::Failed
            } else {
                next.last_error = Some(reason.clone());
                Phase::CiFix
            }
        }
        (Phase::CiFix, Event::CiFixPushed) => Phase::CiVerify,
        (Phase::CommentVerify, Event::CommentsResolved) => Phase::Completed,
        (Phase::CommentVerify, Event::CommentsPending { count }) => {
            if next.comment_attempts >= MAX_COMMENT_ATTEMPTS {
                next.last_error = Some(format!(
                    "comment attempt ceiling reached ({MAX_COMMENT_ATTEMPTS} attempts): \
                     {count} comment(s) still pending"
                ));
                Phase::Failed
            } else {
                next.comment_attempts += 1;
                Phase::CommentFix
            }
        }
        (Phase::CommentFix, Event::CommentFixPushed) => Phase::CommentVerify,
        _ => return reject(),
    };

    next.record_signal(event.signal_name(), now, event.data_map());
    Ok(Transition {
        phase: target,
        context: next,
    })
}
