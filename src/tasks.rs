//! Phase-to-task mapping.
//!
//! A pure lookup from the current phase (and context) to the next unit of
//! work for the external worker: a prompt, an optional working-directory
//! override, and the timeout bounding the invocation. Terminal phases and
//! `idle` map to `None`.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::context::WorkflowContext;
use crate::phase::Phase;

/// One unit of work handed to the external worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerTask {
    pub prompt: String,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

const SIGNAL_RULES: &str = "\
## SIGNAL RULES
1. Verify your work before signaling; never claim completion for unverified work
2. Emit exactly one completion signal, as plain text on its own line
3. Auxiliary data goes on `key: value` lines directly after the signal
4. If you cannot make progress, emit <promise>FAILED</promise> with an \
<error>description</error> tag
";

/// Map `phase` to the next worker task, or `None` when the phase has no
/// outstanding work (the loop then advances without invoking the worker).
pub fn task_for_phase(phase: Phase, ctx: &WorkflowContext, config: &Config) -> Option<WorkerTask> {
    let research = ctx.research_file.as_deref().unwrap_or("(not recorded)");

    let (body, timeout) = match phase {
        Phase::Idle | Phase::Completed | Phase::Failed => return None,
        Phase::Setup => (
            format!(
                "Prepare the delivery workspace for the research artifact at {research}.\n\
                 Create an isolated worktree and a feature branch for this work.\n\n\
                 When the workspace is ready, output:\n\
                 <phase>SETUP_COMPLETE</phase>\n\
                 worktree_path: <absolute path>\n\
                 branch: <branch name>"
            ),
            config.worker_timeout,
        ),
        Phase::Planning => (
            format!(
                "Read the research artifact at {research} and break the work into an \
                 ordered list of plan documents under plans/, one unit per file \
                 (plans/01.md, plans/02.md, ...).\n\n\
                 When every plan document is written, output:\n\
                 <phase>PLANNING_COMPLETE</phase>\n\
                 plan_count: <number of plan documents>"
            ),
            config.worker_timeout,
        ),
        Phase::Implementing => match ctx.current_plan() {
            Some(plan) => (
                format!(
                    "Implement the plan document at {}.\n\
                     Follow it exactly; run the project's tests and checks to verify.\n\n\
                     When this plan is fully implemented and verified, output:\n\
                     <plan>PLAN_{}_COMPLETE</plan>",
                    plan.path,
                    ctx.current_plan_index + 1
                ),
                config.worker_timeout,
            ),
            None => (
                "All plan documents are implemented. Review the combined changes, \
                 run the full test suite, and fix anything broken.\n\n\
                 When the implementation is coherent and verified, output:\n\
                 <phase>IMPLEMENTATION_COMPLETE</phase>"
                    .to_string(),
                config.worker_timeout,
            ),
        },
        Phase::Submitting => (
            format!(
                "Push the branch {} and open a pull request for this work.\n\n\
                 When the pull request exists, output:\n\
                 <phase>PR_CREATED</phase>\n\
                 pr_number: <number>\n\
                 pr_url: <url>",
                ctx.branch.as_deref().unwrap_or("(current branch)")
            ),
            config.worker_timeout,
        ),
        Phase::CiVerify => (
            format!(
                "Poll CI for pull request {} until every check settles.\n\n\
                 If all checks pass, output:\n\
                 <phase>CI_PASSED</phase>\n\n\
                 If any check fails, output:\n\
                 <phase>CI_FAILED</phase>\n\
                 <error>concise description of the failure</error>",
                pr_reference(ctx)
            ),
            config.poll_timeout,
        ),
        Phase::CiFix => (
            format!(
                "CI failed for pull request {}: {}\n\
                 Diagnose the failure, fix it, and push the fix to the branch.\n\n\
                 When the fix is pushed, output:\n\
                 <phase>CI_FIX_PUSHED</phase>",
                pr_reference(ctx),
                ctx.last_error.as_deref().unwrap_or("(no recorded reason)")
            ),
            config.worker_timeout,
        ),
        Phase::CommentVerify => (
            format!(
                "Check the review comments on pull request {}.\n\n\
                 If every comment thread is resolved, output:\n\
                 <phase>COMMENTS_RESOLVED</phase>\n\n\
                 If threads remain open, output:\n\
                 <phase>COMMENTS_PENDING</phase>\n\
                 comment_count: <number of open threads>",
                pr_reference(ctx)
            ),
            config.poll_timeout,
        ),
        Phase::CommentFix => (
            format!(
                "Address the open review comments on pull request {}. Make the \
                 requested changes, reply to each thread, and push to the branch.\n\n\
                 When the fixes are pushed, output:\n\
                 <phase>COMMENT_FIX_PUSHED</phase>",
                pr_reference(ctx)
            ),
            config.worker_timeout,
        ),
    };

    Some(WorkerTask {
        prompt: format!("{body}\n\n{SIGNAL_RULES}"),
        working_dir: ctx.worktree.clone().map(PathBuf::from),
        timeout,
    })
}

fn pr_reference(ctx: &WorkflowContext) -> String {
    match (ctx.pr_number, ctx.pr_url.as_deref()) {
        (Some(n), Some(url)) => format!("#{n} ({url})"),
        (Some(n), None) => format!("#{n}"),
        (None, Some(url)) => url.to_string(),
        (None, None) => "(unknown)".to_string(),
    }
}
