//! Crate-wide error type.
//!
//! All fallible operations surface one of the variants below. Nothing is
//! retried and nothing is silently recovered; a model under construction is
//! discarded on the first error.

use thiserror::Error;

use crate::types::TypeInfo;

/// Errors reported by the model data structures, builder, serializer and
/// prediction engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A builder method was called in a state where it is not legal.
    #[error("illegal call to {call}() in builder state {state}")]
    BuilderState {
        call: &'static str,
        state: &'static str,
    },

    /// Metadata or arguments contradict a model constraint.
    #[error("validation error: {0}")]
    Validation(String),

    /// A tree violates a structural invariant (orphans, cycles, bad links).
    #[error("structural error: {0}")]
    Structural(String),

    /// Mismatched threshold/leaf/input numeric types.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: TypeInfo, got: TypeInfo },

    /// Malformed JSON configuration or model JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// Version incompatibility, truncated input or I/O failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unknown post-processor or prediction-kind name.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Serialization(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
