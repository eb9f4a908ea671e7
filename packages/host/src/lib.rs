//! # edgebridge-host
//!
//! The host call layer: the narrow waist between the guest runtime and the
//! edge platform's capability interface.
//!
//! Everything at this level is handle-based and synchronous. A host call
//! takes an opaque handle plus an operation-specific payload, performs
//! exactly one host-side operation, and returns a [`HostResult`]. There is
//! no batching, no retry and no business validation here; name and key
//! checks live in [`validate`] and are run by builtins before any call.
//!
//! ## Implementations
//!
//! - `WasmHost`: the real platform, reached through raw wasm imports
//!   (only compiled for `wasm32`).
//! - [`InMemoryHost`]: a deterministic fake that records every call and
//!   supports fault injection, so the stream adapters and body logic are
//!   testable without a platform.
//!
//! # Example
//!
//! ```rust
//! use edgebridge_host::{Host, InMemoryHost, OptionalResult};
//!
//! let mut host = InMemoryHost::new();
//! host.add_dictionary("Config 1", [("token", "s3cr3t")]);
//!
//! let dict = host.dictionary_open("Config 1").unwrap();
//! let token = host.dictionary_get(dict, "token").optional().unwrap();
//! assert_eq!(token.as_deref(), Some("s3cr3t"));
//! ```

pub use bytes::Bytes;

mod error;
mod handle;
mod host;
mod memory;
pub mod validate;

#[cfg(target_arch = "wasm32")]
mod abi;

pub use error::{HostError, HostResult, HostStatus, OptionalResult};
pub use handle::{
    AnyHandle, BodyHandle, DictionaryHandle, HandleKind, LogEndpointHandle, ObjectStoreHandle,
    ResourceHandle, INVALID_HANDLE,
};
pub use host::{Host, HostOp};
pub use memory::{HostCall, InMemoryHost};
pub use validate::ValidationError;

#[cfg(target_arch = "wasm32")]
pub use abi::WasmHost;
