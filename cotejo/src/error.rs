//! Error types for cotejo.
//!
//! The taxonomy separates what a phase can absorb from what must stop a run:
//!
//! | Variant | Handling |
//! |---------|----------|
//! | [`Error::Precondition`] | the phase refuses to run; earlier outputs are kept |
//! | [`Error::VoterUnavailable`] | the voter is dropped, confidence degrades |
//! | [`Error::AmbiguousResolution`] | the resolver abstains |
//! | [`Error::DataIntegrity`] | fatal, aborts the run |
//! | [`Error::Cancelled`] | the run stops with a distinct outcome |

use crate::pipeline::Phase;
use thiserror::Error;

/// Result type for cotejo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cotejo operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A phase's required input is missing or empty.
    #[error("Precondition failed for {phase}: {reason}")]
    Precondition {
        /// Phase that refused to run.
        phase: Phase,
        /// What was missing.
        reason: String,
    },

    /// A signal source could not answer.
    #[error("Voter '{voter}' unavailable: {reason}")]
    VoterUnavailable {
        /// Voter or signal name.
        voter: String,
        /// Backend message.
        reason: String,
    },

    /// No candidate reached the confidence needed to decide.
    #[error("Ambiguous resolution: {0}")]
    AmbiguousResolution(String),

    /// An invariant was violated; indicates a logic bug.
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// The run was cancelled.
    #[error("Cancelled during {phase}")]
    Cancelled {
        /// Phase that observed the cancellation.
        phase: Phase,
    },

    /// The shared weight table is in use by an analysis run.
    #[error("Voting weights are locked: {0}")]
    WeightsLocked(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from the data model.
    #[error(transparent)]
    Core(#[from] cotejo_core::Error),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a precondition error.
    pub fn precondition(phase: Phase, reason: impl Into<String>) -> Self {
        Error::Precondition {
            phase,
            reason: reason.into(),
        }
    }

    /// Create a voter-unavailable error.
    pub fn voter_unavailable(voter: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::VoterUnavailable {
            voter: voter.into(),
            reason: reason.into(),
        }
    }

    /// Create an ambiguous-resolution error.
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Error::AmbiguousResolution(msg.into())
    }

    /// Create a data integrity error.
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Error::DataIntegrity(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Recast a voter's error as [`Error::VoterUnavailable`] naming it.
    pub(crate) fn attributed_to(self, voter: &str) -> Self {
        match self {
            Error::VoterUnavailable { .. } => self,
            other => Error::voter_unavailable(voter, other.to_string()),
        }
    }

    /// Only integrity violations abort a whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DataIntegrity(_) | Error::Core(cotejo_core::Error::DataIntegrity(_))
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_integrity_is_fatal() {
        assert!(Error::data_integrity("mention in two chains").is_fatal());
        assert!(Error::Core(cotejo_core::Error::data_integrity("x")).is_fatal());
        assert!(!Error::voter_unavailable("llm", "timeout").is_fatal());
        assert!(!Error::precondition(Phase::Coreference, "no mentions").is_fatal());
        assert!(!Error::Cancelled { phase: Phase::Ner }.is_fatal());
    }

    #[test]
    fn test_messages() {
        let e = Error::voter_unavailable("llm", "connection refused");
        assert_eq!(e.to_string(), "Voter 'llm' unavailable: connection refused");
        let e = Error::precondition(Phase::Fusion, "no entities");
        assert_eq!(e.to_string(), "Precondition failed for fusion: no entities");
    }
}
