//! Signal parsing from the worker's raw output.
//!
//! Recognized tags, in priority order:
//! - `<phase>SIGNAL_NAME</phase>` against a fixed allow-list
//! - `<plan>PLAN_<N>_COMPLETE</plan>` with a numeric capture
//! - `<promise>FAILED</promise>` (paired with an optional
//!   `<error>MESSAGE</error>`) and `<promise>COMPLETE</promise>`
//!
//! Auxiliary `key: value` lines near a tag are mined by
//! [`extract_signal_data`] using per-signal field maps.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::machine::Event;

// Compile regexes once using LazyLock
static PHASE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<phase>\s*([A-Z][A-Z0-9_]*)\s*</phase>").unwrap());

static PLAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<plan>\s*PLAN_(\d+)_COMPLETE\s*</plan>").unwrap());

static PROMISE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<promise>\s*(COMPLETE|FAILED)\s*</promise>").unwrap());

// Error tags may span lines.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<error>\s*(.*?)\s*</error>").unwrap());

/// Phase-completion signal names the parser accepts. Unknown names inside
/// `<phase>` tags are skipped, not errors.
pub const PHASE_SIGNALS: [&str; 10] = [
    "SETUP_COMPLETE",
    "PLANNING_COMPLETE",
    "IMPLEMENTATION_COMPLETE",
    "PR_CREATED",
    "CI_PASSED",
    "CI_FAILED",
    "CI_FIX_PUSHED",
    "COMMENTS_RESOLVED",
    "COMMENTS_PENDING",
    "COMMENT_FIX_PUSHED",
];

/// `key: value` fields mined for each signal name. Signals not listed here
/// carry no auxiliary data.
fn signal_fields(signal: &str) -> &'static [&'static str] {
    match signal {
        "SETUP_COMPLETE" => &["worktree_path", "branch", "research_file"],
        "PLANNING_COMPLETE" => &["plan_count"],
        "PR_CREATED" => &["pr_number", "pr_url"],
        "CI_FAILED" => &["error"],
        "COMMENTS_PENDING" => &["comment_count"],
        _ => &[],
    }
}

/// Extract the highest-priority recognized signal from `text`.
///
/// Never panics; returns `None` when no recognized tag is present. When a
/// phase tag and a plan tag appear in the same blob, the phase tag wins —
/// the most work-advancing signal takes precedence.
pub fn parse(text: &str) -> Option<Event> {
    for cap in PHASE_REGEX.captures_iter(text) {
        let name = match cap.get(1) {
            Some(m) => m.as_str(),
            None => continue,
        };
        if PHASE_SIGNALS.contains(&name) {
            return Some(build_phase_event(name, text));
        }
        tracing::debug!(signal = name, "ignoring unknown phase signal");
    }

    if let Some(cap) = PLAN_REGEX.captures(text) {
        if let Ok(n) = cap[1].parse::<usize>() {
            if n > 0 {
                return Some(Event::PlanComplete { plan_number: n });
            }
        }
    }

    if let Some(cap) = PROMISE_REGEX.captures(text) {
        return Some(build_promise_event(&cap[1], text));
    }

    None
}

/// Every recognized signal in `text`, in document order.
///
/// Diagnostic/replay aid only: the orchestrator consumes exactly one event
/// per iteration and must not be driven from this.
pub fn parse_all_signals(text: &str) -> Vec<Event> {
    let mut found: Vec<(usize, Event)> = Vec::new();

    for cap in PHASE_REGEX.captures_iter(text) {
        let m = match cap.get(1) {
            Some(m) => m,
            None => continue,
        };
        if PHASE_SIGNALS.contains(&m.as_str()) {
            found.push((m.start(), build_phase_event(m.as_str(), text)));
        }
    }
    for cap in PLAN_REGEX.captures_iter(text) {
        if let (Some(whole), Ok(n)) = (cap.get(0), cap[1].parse::<usize>()) {
            if n > 0 {
                found.push((whole.start(), Event::PlanComplete { plan_number: n }));
            }
        }
    }
    for cap in PROMISE_REGEX.captures_iter(text) {
        if let Some(whole) = cap.get(0) {
            found.push((whole.start(), build_promise_event(&cap[1], text)));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, event)| event).collect()
}

/// Mine the auxiliary `key: value` lines associated with `signal` from
/// `text`. Absent fields are omitted from the map, never defaulted.
pub fn extract_signal_data(signal: &str, text: &str) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    for field in signal_fields(signal) {
        // Anchored per-line so prose mentioning the key mid-sentence is not
        // picked up.
        let pattern = format!(r"(?m)^\s*{}\s*:\s*(.+?)\s*$", regex::escape(field));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(_) => continue,
        };
        if let Some(cap) = re.captures(text) {
            let value = cap[1].trim();
            if !value.is_empty() {
                data.insert((*field).to_string(), value.to_string());
            }
        }
    }
    data
}

fn build_phase_event(name: &str, text: &str) -> Event {
    let data = extract_signal_data(name, text);
    match name {
        "SETUP_COMPLETE" => Event::SetupComplete {
            worktree: data.get("worktree_path").cloned(),
            branch: data.get("branch").cloned(),
        },
        "PLANNING_COMPLETE" => Event::PlanningComplete {
            plan_count: data
                .get("plan_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        },
        "IMPLEMENTATION_COMPLETE" => Event::ImplementationComplete,
        "PR_CREATED" => Event::PrCreated {
            number: data.get("pr_number").and_then(|v| v.parse().ok()),
            url: data.get("pr_url").cloned(),
        },
        "CI_PASSED" => Event::CiPassed,
        "CI_FAILED" => Event::CiFailed {
            reason: error_message(text)
                .or_else(|| data.get("error").cloned())
                .unwrap_or_else(|| "Unknown error".to_string()),
        },
        "CI_FIX_PUSHED" => Event::CiFixPushed,
        "COMMENTS_RESOLVED" => Event::CommentsResolved,
        "COMMENTS_PENDING" => Event::CommentsPending {
            count: data
                .get("comment_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        },
        "COMMENT_FIX_PUSHED" => Event::CommentFixPushed,
        // Callers only pass allow-listed names.
        other => Event::Fail {
            reason: format!("unhandled signal name: {other}"),
        },
    }
}

fn build_promise_event(verdict: &str, text: &str) -> Event {
    match verdict {
        "FAILED" => Event::Fail {
            reason: error_message(text).unwrap_or_else(|| "Unknown error".to_string()),
        },
        // The terminal success promise. Outside comment_verify the state
        // machine rejects it as a stray signal, which is the intended no-op.
        _ => Event::CommentsResolved,
    }
}

fn error_message(text: &str) -> Option<String> {
    ERROR_REGEX
        .captures(text)
        .map(|cap| cap[1].to_string())
        .filter(|m| !m.is_empty())
}
