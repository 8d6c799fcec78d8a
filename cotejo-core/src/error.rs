//! Error types for cotejo-core.

use thiserror::Error;

/// Result type for cotejo-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cotejo-core operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parse error (CoNLL-U, morphology features).
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number in the source.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A structural invariant of the data model was violated.
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a parse error for a given line.
    #[must_use]
    pub fn parse(line: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: msg.into(),
        }
    }

    /// Create a data integrity error.
    #[must_use]
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }
}
