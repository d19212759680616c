//! Pipeline phase definitions for the foreman orchestrator.
//!
//! A workflow is always in exactly one [`Phase`]. `Completed` and `Failed`
//! are terminal: the state machine defines no outgoing transitions for them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stage of the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// No workflow started yet.
    Idle,
    /// Preparing the workspace (worktree, branch).
    Setup,
    /// Breaking the research artifact into plan units.
    Planning,
    /// Working through plan units one at a time.
    Implementing,
    /// Opening the pull request.
    Submitting,
    /// Waiting on a CI verdict.
    CiVerify,
    /// Repairing a CI failure.
    CiFix,
    /// Waiting on review-comment resolution status.
    CommentVerify,
    /// Addressing outstanding review comments.
    CommentFix,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl Phase {
    /// Whether this phase has no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Upper-snake token used in the progress file and signal history.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Setup => "SETUP",
            Phase::Planning => "PLANNING",
            Phase::Implementing => "IMPLEMENTING",
            Phase::Submitting => "SUBMITTING",
            Phase::CiVerify => "CI_VERIFY",
            Phase::CiFix => "CI_FIX",
            Phase::CommentVerify => "COMMENT_VERIFY",
            Phase::CommentFix => "COMMENT_FIX",
            Phase::Completed => "COMPLETED",
            Phase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "IDLE" => Ok(Phase::Idle),
            "SETUP" => Ok(Phase::Setup),
            "PLANNING" => Ok(Phase::Planning),
            "IMPLEMENTING" => Ok(Phase::Implementing),
            "SUBMITTING" => Ok(Phase::Submitting),
            "CI_VERIFY" => Ok(Phase::CiVerify),
            "CI_FIX" => Ok(Phase::CiFix),
            "COMMENT_VERIFY" => Ok(Phase::CommentVerify),
            "COMMENT_FIX" => Ok(Phase::CommentFix),
            "COMPLETED" => Ok(Phase::Completed),
            "FAILED" => Ok(Phase::Failed),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Error returned when a phase token in a persisted file is unrecognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown phase token: {}", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 11] = [
        Phase::Idle,
        Phase::Setup,
        Phase::Planning,
        Phase::Implementing,
        Phase::Submitting,
        Phase::CiVerify,
        Phase::CiFix,
        Phase::CommentVerify,
        Phase::CommentFix,
        Phase::Completed,
        Phase::Failed,
    ];

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        for phase in ALL {
            let expect = matches!(phase, Phase::Completed | Phase::Failed);
            assert_eq!(phase.is_terminal(), expect, "phase {phase}");
        }
    }

    #[test]
    fn test_display_from_str_roundtrip() {
        for phase in ALL {
            let token = phase.to_string();
            let parsed: Phase = token.parse().unwrap();
            assert_eq!(parsed, phase);
        }
    }

    #[test]
    fn test_from_str_trims_whitespace() {
        let parsed: Phase = "  CI_VERIFY \n".parse().unwrap();
        assert_eq!(parsed, Phase::CiVerify);
    }

    #[test]
    fn test_from_str_unknown_token() {
        let err = "BOGUS".parse::<Phase>().unwrap_err();
        assert!(err.to_string().contains("BOGUS"));
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Phase::CommentVerify).unwrap();
        assert_eq!(json, "\"COMMENT_VERIFY\"");
        let parsed: Phase = serde_json::from_str("\"CI_FIX\"").unwrap();
        assert_eq!(parsed, Phase::CiFix);
    }
}
