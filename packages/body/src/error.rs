//! Error types for body operations.

use edgebridge_host::{HostError, HostOp};
use edgebridge_streams::StreamError;
use thiserror::Error;

use crate::TargetType;

#[derive(Debug, Error)]
pub enum BodyError {
    /// The body was already consumed by an earlier full read.
    #[error("body has already been used")]
    AlreadyUsed,

    /// Something else holds the body's reader lock.
    #[error("body stream is locked")]
    Locked,

    /// Reading the body's stream failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A host call made while building a body failed.
    #[error("{op} failed: {error}")]
    Host { op: HostOp, error: HostError },

    /// The bytes were read but could not be decoded.
    #[error("could not parse body as {target}: {message}")]
    Parse { target: TargetType, message: String },

    /// The stream stopped producing data without finishing.
    #[error("body stream stalled before completion")]
    Stalled,
}

impl BodyError {
    pub(crate) fn host(op: HostOp) -> impl FnOnce(HostError) -> Self {
        move |error| BodyError::Host { op, error }
    }

    pub(crate) fn parse(target: TargetType, message: impl ToString) -> Self {
        BodyError::Parse {
            target,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BodyError>;
