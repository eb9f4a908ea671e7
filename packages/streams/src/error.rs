//! Error types for stream adapters.

use edgebridge_host::{HostError, HostOp};
use thiserror::Error;

/// Errors observed through a stream's error channel.
///
/// Once a stream is errored it stores its `StreamError` and every later read
/// or write on that stream returns a clone of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A host call made by an adapter algorithm failed.
    #[error("{op} failed: {error}")]
    Host { op: HostOp, error: HostError },

    /// The stream is locked to a reader, writer or pipe.
    #[error("stream is locked")]
    Locked,

    /// A reader or writer token was used on a stream it does not lock.
    #[error("token does not hold the lock on this stream")]
    NotLockHolder,

    /// The stream is closed or closing.
    #[error("stream is closed")]
    Closed,

    /// The consumer canceled the stream.
    #[error("stream was canceled")]
    Canceled,

    /// The producer aborted the stream.
    #[error("stream was aborted")]
    Aborted,

    /// A guest-supplied algorithm (source, sink or transformer) failed.
    #[error("{0}")]
    Algorithm(String),

    /// The stream id no longer resolves to a live adapter.
    #[error("stream has been released")]
    Released,
}

impl StreamError {
    /// Wrap a failed host call.
    pub fn host(op: HostOp, error: HostError) -> Self {
        StreamError::Host { op, error }
    }

    /// Convenience for guest algorithm failures.
    pub fn algorithm(message: impl Into<String>) -> Self {
        StreamError::Algorithm(message.into())
    }

    /// The host error kind, if this came from a host call.
    pub fn host_error(&self) -> Option<HostError> {
        match self {
            StreamError::Host { error, .. } => Some(*error),
            _ => None,
        }
    }
}

/// Result type alias for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
