//! Per-phase results: status, item counts and the issues met on the way.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ner,
    Coreference,
    Fusion,
    Attributes,
    Consistency,
}

impl Phase {
    /// All phases in dependency order.
    pub const ORDER: [Phase; 5] = [
        Phase::Ner,
        Phase::Coreference,
        Phase::Fusion,
        Phase::Attributes,
        Phase::Consistency,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Ner => "ner",
            Phase::Coreference => "coreference",
            Phase::Fusion => "fusion",
            Phase::Attributes => "attributes",
            Phase::Consistency => "consistency",
        };
        f.write_str(s)
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    /// Refused to run because its input was missing or empty.
    PreconditionFailed,
    Cancelled,
    /// Not reached because an earlier phase stopped the run.
    Skipped,
}

/// Category of a non-fatal issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum IssueKind {
    VoterUnavailable { voter: String },
    Ambiguous,
    LimitReached,
    Precondition,
    Other,
}

/// Something a phase met and absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub phase: Phase,
    pub kind: IssueKind,
    pub message: String,
}

impl Issue {
    /// Convert a recoverable error into an issue.
    #[must_use]
    pub fn from_error(phase: Phase, err: &Error) -> Self {
        let kind = match err {
            Error::VoterUnavailable { voter, .. } => IssueKind::VoterUnavailable {
                voter: voter.clone(),
            },
            Error::AmbiguousResolution(_) => IssueKind::Ambiguous,
            Error::Precondition { .. } => IssueKind::Precondition,
            _ => IssueKind::Other,
        };
        Self {
            phase,
            kind,
            message: err.to_string(),
        }
    }

    /// A resource cap was hit.
    #[must_use]
    pub fn limit(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind: IssueKind::LimitReached,
            message: message.into(),
        }
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Number of items the phase produced (mentions, chains, merges, ...).
    pub items: usize,
    pub issues: Vec<Issue>,
    pub elapsed_ms: u64,
}

impl PhaseReport {
    pub(crate) fn new(phase: Phase, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            items: 0,
            issues: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Report for a phase that was never reached.
    #[must_use]
    pub fn skipped(phase: Phase) -> Self {
        Self::new(phase, PhaseStatus::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_from_voter_error() {
        let err = Error::voter_unavailable("llm", "timeout");
        let issue = Issue::from_error(Phase::Ner, &err);
        assert_eq!(
            issue.kind,
            IssueKind::VoterUnavailable {
                voter: "llm".into()
            }
        );
        assert!(issue.message.contains("timeout"));
    }

    #[test]
    fn test_phase_order() {
        let mut sorted = Phase::ORDER;
        sorted.sort();
        assert_eq!(sorted, Phase::ORDER);
    }
}
