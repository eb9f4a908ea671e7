//! Typed resource handles.
//!
//! A handle is an opaque integer naming a host-owned resource. Validity is
//! structural: the sentinel [`INVALID_HANDLE`] means "unopened", anything
//! else is passed to the host as-is and the host decides whether it is live.
//! Each resource kind gets its own newtype so a body handle can never be
//! handed to a dictionary call.

/// Sentinel value for a handle that was never opened.
pub const INVALID_HANDLE: u32 = u32::MAX - 1;

/// The kind of resource a handle names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    Body,
    Dictionary,
    LogEndpoint,
    ObjectStore,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandleKind::Body => "body",
            HandleKind::Dictionary => "dictionary",
            HandleKind::LogEndpoint => "log endpoint",
            HandleKind::ObjectStore => "object store",
        };
        f.write_str(name)
    }
}

/// Common behavior of the typed handle newtypes.
pub trait ResourceHandle: Copy + Eq + std::fmt::Debug {
    /// The resource kind this handle type names.
    const KIND: HandleKind;

    /// Wrap a raw value returned by the host.
    fn from_raw(value: u32) -> Self;

    /// The raw value passed to the host.
    fn as_raw(&self) -> u32;

    /// A handle that was never opened.
    fn invalid() -> Self {
        Self::from_raw(INVALID_HANDLE)
    }

    /// Structural validity: not the sentinel.
    fn is_valid(&self) -> bool {
        self.as_raw() != INVALID_HANDLE
    }

    /// Erase the kind into an [`AnyHandle`] for diagnostics.
    fn erase(&self) -> AnyHandle {
        AnyHandle {
            kind: Self::KIND,
            value: self.as_raw(),
        }
    }
}

macro_rules! resource_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl ResourceHandle for $name {
            const KIND: HandleKind = $kind;

            fn from_raw(value: u32) -> Self {
                Self(value)
            }

            fn as_raw(&self) -> u32 {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                <Self as ResourceHandle>::invalid()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

resource_handle!(
    /// A request or response body, or an object store value.
    BodyHandle,
    HandleKind::Body
);
resource_handle!(
    /// An open edge dictionary or config store.
    DictionaryHandle,
    HandleKind::Dictionary
);
resource_handle!(
    /// A named log endpoint.
    LogEndpointHandle,
    HandleKind::LogEndpoint
);
resource_handle!(
    /// An open key-value object store.
    ObjectStoreHandle,
    HandleKind::ObjectStore
);

/// A handle with its kind erased, used in logs and call records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnyHandle {
    pub kind: HandleKind,
    pub value: u32,
}

impl std::fmt::Display for AnyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.value)
    }
}
