//! Error taxonomy for host calls.
//!
//! The platform reports failures as numeric status codes. Those codes stop
//! here: everything above this layer sees a [`HostError`] kind, never a raw
//! number.

use thiserror::Error;

/// The fixed set of failure kinds a host call can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum HostError {
    /// The handle is invalid or the resource behind it is closed.
    #[error("bad handle")]
    BadHandle,

    /// The payload was malformed (oversized key, bad UTF-8, ...).
    #[error("invalid argument")]
    InvalidArgument,

    /// A lookup found nothing.
    ///
    /// This is not a failure; callers translate it into an empty result
    /// with [`OptionalResult::optional`].
    #[error("no value")]
    OptionalNone,

    /// Unclassified host failure.
    #[error("host error")]
    Generic,
}

impl HostError {
    /// True for [`HostError::OptionalNone`].
    pub fn is_none(&self) -> bool {
        matches!(self, HostError::OptionalNone)
    }
}

/// Result of a single host call.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Translate "found nothing" into an empty result.
pub trait OptionalResult<T> {
    /// `Err(OptionalNone)` becomes `Ok(None)`, `Ok(v)` becomes `Ok(Some(v))`,
    /// any other error is passed through unchanged.
    fn optional(self) -> HostResult<Option<T>>;
}

impl<T> OptionalResult<T> for HostResult<T> {
    fn optional(self) -> HostResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(HostError::OptionalNone) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Raw status code returned by every platform import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct HostStatus(pub u32);

impl HostStatus {
    pub const OK: HostStatus = HostStatus(0);
    pub const ERROR: HostStatus = HostStatus(1);
    pub const INVAL: HostStatus = HostStatus(2);
    pub const BADF: HostStatus = HostStatus(3);
    pub const BUFLEN: HostStatus = HostStatus(4);
    pub const UNSUPPORTED: HostStatus = HostStatus(5);
    pub const NONE: HostStatus = HostStatus(10);

    /// Map a status code onto the error taxonomy.
    ///
    /// Unknown codes are `Generic`.
    pub fn into_result(self) -> HostResult<()> {
        match self {
            HostStatus::OK => Ok(()),
            HostStatus::INVAL | HostStatus::BUFLEN => Err(HostError::InvalidArgument),
            HostStatus::BADF => Err(HostError::BadHandle),
            HostStatus::NONE => Err(HostError::OptionalNone),
            _ => Err(HostError::Generic),
        }
    }
}

impl From<HostError> for HostStatus {
    fn from(error: HostError) -> Self {
        match error {
            HostError::BadHandle => HostStatus::BADF,
            HostError::InvalidArgument => HostStatus::INVAL,
            HostError::OptionalNone => HostStatus::NONE,
            HostError::Generic => HostStatus::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(HostStatus::OK.into_result(), Ok(()));
        assert_eq!(HostStatus::BADF.into_result(), Err(HostError::BadHandle));
        assert_eq!(
            HostStatus::INVAL.into_result(),
            Err(HostError::InvalidArgument)
        );
        assert_eq!(
            HostStatus::BUFLEN.into_result(),
            Err(HostError::InvalidArgument)
        );
        assert_eq!(HostStatus::NONE.into_result(), Err(HostError::OptionalNone));
        assert_eq!(HostStatus::ERROR.into_result(), Err(HostError::Generic));
        assert_eq!(
            HostStatus::UNSUPPORTED.into_result(),
            Err(HostError::Generic)
        );
    }

    #[test]
    fn unknown_status_is_generic() {
        assert_eq!(HostStatus(77).into_result(), Err(HostError::Generic));
    }

    #[test]
    fn error_kinds_round_trip_through_status() {
        for kind in [
            HostError::BadHandle,
            HostError::InvalidArgument,
            HostError::OptionalNone,
            HostError::Generic,
        ] {
            assert_eq!(HostStatus::from(kind).into_result(), Err(kind));
        }
    }

    #[test]
    fn optional_translates_none_only() {
        let found: HostResult<u32> = Ok(7);
        assert_eq!(found.optional(), Ok(Some(7)));

        let missing: HostResult<u32> = Err(HostError::OptionalNone);
        assert_eq!(missing.optional(), Ok(None));

        let bad: HostResult<u32> = Err(HostError::BadHandle);
        assert_eq!(bad.optional(), Err(HostError::BadHandle));
    }

    #[test]
    fn display_never_shows_codes() {
        let shown = HostError::BadHandle.to_string();
        assert_eq!(shown, "bad handle");
        assert!(!shown.chars().any(|c| c.is_ascii_digit()));
    }
}
