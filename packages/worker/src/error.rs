//! Error types for the worker.

use edgebridge_body::BodyError;
use edgebridge_builtins::ScriptError;
use edgebridge_host::{HostError, HostOp};
use edgebridge_streams::StreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Reading a config file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A config document did not parse.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// A config document parsed but holds unusable values.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The request handler raised.
    #[error("handler failed: {0}")]
    Handler(#[from] ScriptError),

    #[error("response body: {0}")]
    Body(#[from] BodyError),

    #[error("response stream failed: {0}")]
    Stream(#[from] StreamError),

    #[error("{op} failed: {error}")]
    Host { op: HostOp, error: HostError },

    /// The response stream stopped producing data before it finished.
    #[error("response stream stalled")]
    Stalled,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
