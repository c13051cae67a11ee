//! Error types for the value model.

use crate::value::ValueKind;
use thiserror::Error;

/// Errors raised while building, coercing or decoding values.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: ValueKind, found: ValueKind },

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Incompatible units: cannot convert {from} to {to}")]
    IncompatibleUnits { from: String, to: String },

    #[error("Malformed value tree: {0}")]
    MalformedTree(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ValueResult<T> = std::result::Result<T, ValueError>;
