//! Pipeline-specific error types.

use crate::pipeline::id::LinkId;
use crate::value::{Value, ValueError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
///
/// Wiring, type and state errors are raised synchronously by the call
/// that caused them and are never retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input port '{element}.{port}' already has a link")]
    TooManyInputs { element: String, port: String },

    #[error("Unknown port '{element}.{port}'")]
    UnknownPort { element: String, port: String },

    #[error("Port '{element}.{port}' is already declared")]
    DuplicatePort { element: String, port: String },

    #[error("Unknown element '{0}'")]
    UnknownElement(String),

    #[error("Element '{0}' is already registered")]
    DuplicateElement(String),

    #[error("Unknown link {0}")]
    UnknownLink(LinkId),

    #[error("Type mismatch on {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Pop from empty link {0}")]
    EmptyChannel(LinkId),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("'{0}' is already started")]
    AlreadyStarted(String),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Element '{element}' failed: {message}")]
    Process { element: String, message: String },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Short human-readable description of a value's type, for error messages.
pub(crate) fn describe(value: &Value) -> String {
    let concrete = value
        .concrete_type()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    if value.abstract_type().is_empty() {
        format!("{}<{}>", value.kind(), concrete)
    } else {
        format!("{}<{}>:{}", value.kind(), concrete, value.abstract_type())
    }
}
