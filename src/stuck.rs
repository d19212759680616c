//! Stuck-loop detection over repeated worker failures.
//!
//! Pure value state, advanced one comparison at a time. The basic detector
//! compares SHA-256 digests of the error text; the category-aware variant
//! additionally buckets errors with substring heuristics so recurring
//! failures that vary textually (line numbers, timestamps) are still caught.

use sha2::{Digest, Sha256};

/// Consecutive identical-digest observations before a loop counts as stuck.
pub const DEFAULT_STUCK_THRESHOLD: u32 = 3;
/// Consecutive same-category observations before a loop counts as stuck.
pub const DEFAULT_CATEGORY_THRESHOLD: u32 = 5;

/// State carried between comparisons of the exact-hash detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StuckState {
    last_error_hash: Option<[u8; 32]>,
    stuck_count: u32,
}

impl StuckState {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many consecutive times the current error has been observed.
    pub fn count(&self) -> u32 {
        self.stuck_count
    }
}

/// Outcome of one detector step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub is_stuck: bool,
    pub next: StuckState,
}

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

/// Compare `error` against the previous observation.
///
/// An identical digest increments the counter; a differing one resets it
/// to 1 and replaces the stored digest. `is_stuck` holds exactly when the
/// new counter has reached `threshold`.
pub fn detect(state: &StuckState, error: &str, threshold: u32) -> Detection {
    let hash = digest(error);
    let stuck_count = match state.last_error_hash {
        Some(prev) if prev == hash => state.stuck_count + 1,
        _ => 1,
    };
    let next = StuckState {
        last_error_hash: Some(hash),
        stuck_count,
    };
    Detection {
        is_stuck: stuck_count >= threshold,
        next,
    }
}

/// Coarse failure buckets for the category-aware detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Build,
    Test,
    Lint,
    Type,
    Timeout,
    Network,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Build => "build",
            ErrorCategory::Test => "test",
            ErrorCategory::Lint => "lint",
            ErrorCategory::Type => "type",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

/// Bucket an error text by substring heuristics. First matching bucket wins.
pub fn classify(error: &str) -> ErrorCategory {
    let text = error.to_lowercase();
    let buckets: [(ErrorCategory, &[&str]); 6] = [
        (
            ErrorCategory::Timeout,
            &["timed out", "timeout", "deadline exceeded"],
        ),
        (
            ErrorCategory::Network,
            &[
                "connection refused",
                "connection reset",
                "network error",
                "dns",
                "tls handshake",
            ],
        ),
        (
            ErrorCategory::Type,
            &["type error", "mismatched types", "type mismatch"],
        ),
        (
            ErrorCategory::Build,
            &[
                "build failed",
                "compilation",
                "compile error",
                "link error",
                "undefined reference",
            ],
        ),
        (
            ErrorCategory::Test,
            &["test failed", "tests failed", "assertion failed", "panicked at"],
        ),
        (ErrorCategory::Lint, &["clippy", "lint"]),
    ];
    for (category, needles) in buckets {
        if needles.iter().any(|n| text.contains(n)) {
            return category;
        }
    }
    ErrorCategory::Unknown
}

/// State for the category-aware detector: exact-hash tracking plus the
/// last observed bucket and its streak length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStuckState {
    hash: StuckState,
    last_category: Option<ErrorCategory>,
    category_count: u32,
}

impl CategoryStuckState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Which criterion tripped the category-aware detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckTrigger {
    IdenticalError,
    RepeatedCategory(ErrorCategory),
}

/// Outcome of one category-aware detector step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDetection {
    pub is_stuck: bool,
    pub trigger: Option<StuckTrigger>,
    pub category: ErrorCategory,
    pub next: CategoryStuckState,
}

/// Dual-criterion step: stuck when the exact digest has repeated
/// `hash_threshold` times, or the same category has repeated
/// `category_threshold` times. `Unknown` never triggers the category
/// criterion — it carries no discriminative signal.
pub fn detect_with_category(
    state: &CategoryStuckState,
    error: &str,
    hash_threshold: u32,
    category_threshold: u32,
) -> CategoryDetection {
    let hash_step = detect(&state.hash, error, hash_threshold);
    let category = classify(error);
    let category_count = match state.last_category {
        Some(prev) if prev == category => state.category_count + 1,
        _ => 1,
    };

    let trigger = if hash_step.is_stuck {
        Some(StuckTrigger::IdenticalError)
    } else if category != ErrorCategory::Unknown && category_count >= category_threshold {
        Some(StuckTrigger::RepeatedCategory(category))
    } else {
        None
    };

    CategoryDetection {
        is_stuck: trigger.is_some(),
        trigger,
        category,
        next: CategoryStuckState {
            hash: hash_step.next,
            last_category: Some(category),
            category_count,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_never_stuck() {
        let d = detect(&StuckState::new(), "error A", DEFAULT_STUCK_THRESHOLD);
        assert!(!d.is_stuck);
        assert_eq!(d.next.count(), 1);
    }

    #[test]
    fn test_stuck_exactly_at_threshold() {
        let mut state = StuckState::new();
        for i in 1..=3 {
            let d = detect(&state, "same error", 3);
            state = d.next;
            assert_eq!(state.count(), i);
            assert_eq!(d.is_stuck, i >= 3, "observation {i}");
        }
    }

    #[test]
    fn test_differing_error_resets_to_one() {
        let mut state = StuckState::new();
        state = detect(&state, "error A", 3).next;
        state = detect(&state, "error A", 3).next;
        assert_eq!(state.count(), 2);

        let d = detect(&state, "error B", 3);
        assert!(!d.is_stuck);
        assert_eq!(d.next.count(), 1);

        // And the new error now has to repeat from scratch.
        let d2 = detect(&d.next, "error A", 3);
        assert_eq!(d2.next.count(), 1);
    }

    #[test]
    fn test_threshold_one_trips_immediately() {
        let d = detect(&StuckState::new(), "anything", 1);
        assert!(d.is_stuck);
    }

    #[test]
    fn test_classify_buckets() {
        let cases = [
            ("Build failed: missing symbol", ErrorCategory::Build),
            ("error: compilation halted", ErrorCategory::Build),
            ("3 tests failed in module auth", ErrorCategory::Test),
            ("assertion failed: left == right", ErrorCategory::Test),
            ("clippy found 2 issues", ErrorCategory::Lint),
            ("mismatched types in handler.rs", ErrorCategory::Type),
            ("request timed out after 30s", ErrorCategory::Timeout),
            ("connection refused by host", ErrorCategory::Network),
            ("something inexplicable", ErrorCategory::Unknown),
        ];
        for (text, expect) in cases {
            assert_eq!(classify(text), expect, "text: {text}");
        }
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("TESTS FAILED"), ErrorCategory::Test);
    }

    #[test]
    fn test_category_detector_catches_varying_text_same_bucket() {
        // Same recurring build error with shifting line numbers.
        let mut state = CategoryStuckState::new();
        let mut tripped = None;
        for i in 1..=5 {
            let d = detect_with_category(
                &state,
                &format!("build failed at line {i}"),
                DEFAULT_STUCK_THRESHOLD,
                DEFAULT_CATEGORY_THRESHOLD,
            );
            state = d.next.clone();
            if d.is_stuck {
                tripped = Some((i, d.trigger.unwrap()));
                break;
            }
        }
        assert_eq!(
            tripped,
            Some((5, StuckTrigger::RepeatedCategory(ErrorCategory::Build)))
        );
    }

    #[test]
    fn test_category_detector_identical_text_trips_on_hash_first() {
        let mut state = CategoryStuckState::new();
        let mut d = detect_with_category(&state, "build failed", 3, 5);
        state = d.next.clone();
        d = detect_with_category(&state, "build failed", 3, 5);
        state = d.next.clone();
        d = detect_with_category(&state, "build failed", 3, 5);
        assert!(d.is_stuck);
        assert_eq!(d.trigger, Some(StuckTrigger::IdenticalError));
    }

    #[test]
    fn test_unknown_category_never_triggers_category_criterion() {
        let mut state = CategoryStuckState::new();
        for i in 1..=20u32 {
            let d = detect_with_category(&state, &format!("weird failure #{i}"), 3, 5);
            assert_eq!(d.category, ErrorCategory::Unknown);
            assert!(
                !matches!(d.trigger, Some(StuckTrigger::RepeatedCategory(_))),
                "observation {i} must not trip on category"
            );
            assert!(!d.is_stuck, "varying unknown errors are not a stuck loop");
            state = d.next;
        }
    }

    #[test]
    fn test_identical_unknown_errors_still_trip_on_hash() {
        let mut state = CategoryStuckState::new();
        let mut last = None;
        for _ in 0..3 {
            let d = detect_with_category(&state, "weird failure", 3, 5);
            state = d.next.clone();
            last = Some(d);
        }
        let d = last.unwrap();
        assert!(d.is_stuck);
        assert_eq!(d.trigger, Some(StuckTrigger::IdenticalError));
    }

    #[test]
    fn test_category_streak_resets_on_bucket_change() {
        let mut state = CategoryStuckState::new();
        for i in 1..=4 {
            state = detect_with_category(&state, &format!("build failed v{i}"), 3, 5).next;
        }
        // Switch bucket: streak restarts, nothing trips.
        let d = detect_with_category(&state, "tests failed: 1", 3, 5);
        assert!(!d.is_stuck);
        assert_eq!(d.category, ErrorCategory::Test);
    }
}
