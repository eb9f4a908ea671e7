//! Errors as guest scripts see them.

use edgebridge_body::BodyError;
use edgebridge_host::validate::ValidationError;
use edgebridge_host::{HostError, HostOp};
use edgebridge_streams::StreamError;
use thiserror::Error;

/// A script-visible exception.
///
/// Messages name the failing operation and the error kind; raw host status
/// codes never reach the script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("Error: {0}")]
    Error(String),
}

impl ScriptError {
    pub fn type_error(message: impl Into<String>) -> Self {
        ScriptError::TypeError(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptError::Error(message.into())
    }

    /// Translate a failed host call.
    pub fn host(op: HostOp, error: HostError) -> Self {
        let message = format!("{op} failed: {error}");
        match error {
            HostError::InvalidArgument => ScriptError::TypeError(message),
            _ => ScriptError::Error(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScriptError::TypeError(message) | ScriptError::Error(message) => message,
        }
    }
}

impl From<ValidationError> for ScriptError {
    fn from(error: ValidationError) -> Self {
        ScriptError::TypeError(error.to_string())
    }
}

impl From<StreamError> for ScriptError {
    fn from(error: StreamError) -> Self {
        match error {
            StreamError::Locked | StreamError::NotLockHolder => {
                ScriptError::TypeError(error.to_string())
            }
            _ => ScriptError::Error(error.to_string()),
        }
    }
}

impl From<BodyError> for ScriptError {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::Stream(inner) => inner.into(),
            BodyError::Host { op, error } => ScriptError::host(op, error),
            BodyError::AlreadyUsed | BodyError::Locked => {
                ScriptError::TypeError(error.to_string())
            }
            _ => ScriptError::Error(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptError>;
