//! Script-visible builtins.
//!
//! Each builtin validates names and keys locally, makes its host calls
//! through [`edgebridge_host::Host`], and reports failures as
//! [`ScriptError`]s. Lookups that find nothing return `Ok(None)`.

mod dictionary;
mod error;
mod logger;
mod object_store;

pub use dictionary::{ConfigStore, Dictionary};
pub use error::{Result, ScriptError};
pub use logger::Logger;
pub use object_store::{ObjectStore, ObjectStoreEntry, ObjectValue};
