//! Error type shared by the codec and the index.

use std::fmt;

/// Longest slice of offending input echoed back in a parse error.
const MAX_ECHO: usize = 64;

/// Errors produced while validating, parsing or indexing vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorError {
    /// The vector length differs from the expected dimensionality.
    DimensionMismatch {
        /// Dimensionality the caller or index requires.
        expected: usize,
        /// Length of the supplied vector.
        actual: usize,
    },
    /// A textual vector literal could not be parsed.
    Parse {
        /// The offending input, truncated for display.
        input: String,
        /// What was wrong with it.
        reason: String,
    },
    /// An element is NaN, infinite, or outside the `f32` range.
    NonFinite {
        /// Zero-based position of the element.
        position: usize,
    },
    /// An argument is outside its accepted range.
    InvalidArgument(String),
    /// The id is already present in the index.
    DuplicateId(u64),
}

impl VectorError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        let input = if input.chars().count() > MAX_ECHO {
            let mut truncated: String = input.chars().take(MAX_ECHO).collect();
            truncated.push_str("...");
            truncated
        } else {
            input.to_string()
        };
        VectorError::Parse {
            input,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            VectorError::Parse { input, reason } => {
                write!(f, "malformed vector literal '{input}': {reason}")
            }
            VectorError::NonFinite { position } => {
                write!(f, "vector element {position} is not a finite f32")
            }
            VectorError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            VectorError::DuplicateId(id) => write!(f, "id {id} is already indexed"),
        }
    }
}

impl std::error::Error for VectorError {}
