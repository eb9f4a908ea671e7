//! Identifiers for registry entries and lock tokens.

use std::fmt;

use crate::arena::Key;

macro_rules! entry_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) Key);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

entry_id!(
    /// A readable stream: the consumer-facing side of a native source.
    ReadableId,
    "readable"
);
entry_id!(
    /// A writable stream: the producer-facing side of a native sink.
    WritableId,
    "writable"
);
entry_id!(
    /// The state shared by the two halves of a transform stream.
    BridgeId,
    "bridge"
);
entry_id!(
    /// A running or finished pipe.
    PipeId,
    "pipe"
);

/// Identifies the object (usually a request or response body) that owns a
/// stream. Opaque to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerKey(pub u64);

/// Proof of holding a readable stream's reader lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderToken(pub(crate) u64);

/// Proof of holding a writable stream's writer lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriterToken(pub(crate) u64);
