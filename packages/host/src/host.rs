//! The host capability interface.

use bytes::Bytes;

use crate::error::HostResult;
use crate::handle::{BodyHandle, DictionaryHandle, LogEndpointHandle, ObjectStoreHandle};

/// Every host operation, for call records and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostOp {
    DictionaryOpen,
    DictionaryGet,
    LogEndpointOpen,
    LogWrite,
    BodyNew,
    BodyRead,
    BodyWrite,
    BodyAppend,
    BodyClose,
    BodyAbandon,
    ObjectStoreOpen,
    ObjectStoreLookup,
    ObjectStoreInsert,
}

impl HostOp {
    /// Stable name used in logs and script-visible messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostOp::DictionaryOpen => "dictionary_open",
            HostOp::DictionaryGet => "dictionary_get",
            HostOp::LogEndpointOpen => "log_endpoint_open",
            HostOp::LogWrite => "log_write",
            HostOp::BodyNew => "body_new",
            HostOp::BodyRead => "body_read",
            HostOp::BodyWrite => "body_write",
            HostOp::BodyAppend => "body_append",
            HostOp::BodyClose => "body_close",
            HostOp::BodyAbandon => "body_abandon",
            HostOp::ObjectStoreOpen => "object_store_open",
            HostOp::ObjectStoreLookup => "object_store_lookup",
            HostOp::ObjectStoreInsert => "object_store_insert",
        }
    }
}

impl std::fmt::Display for HostOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous, handle-based access to the edge platform.
///
/// Each method is exactly one host call. Input buffers are borrowed for the
/// duration of the call only; outputs are owned. Lookups that find nothing
/// return `Err(HostError::OptionalNone)`; use
/// [`OptionalResult::optional`](crate::OptionalResult::optional) to turn that
/// into `Ok(None)`.
///
/// # Object Safety
///
/// This trait is object-safe: stream adapters take `&mut dyn Host`.
pub trait Host {
    /// Open a dictionary (or config store) by name.
    fn dictionary_open(&mut self, name: &str) -> HostResult<DictionaryHandle>;

    /// Look up a key in an open dictionary.
    fn dictionary_get(&mut self, dict: DictionaryHandle, key: &str) -> HostResult<String>;

    /// Open a named log endpoint.
    fn log_endpoint_open(&mut self, name: &str) -> HostResult<LogEndpointHandle>;

    /// Append one message to a log endpoint.
    fn log_write(&mut self, endpoint: LogEndpointHandle, message: &str) -> HostResult<()>;

    /// Create a new, empty, writable body.
    fn body_new(&mut self) -> HostResult<BodyHandle>;

    /// Read up to `max_len` bytes. An empty result means end of stream.
    fn body_read(&mut self, body: BodyHandle, max_len: usize) -> HostResult<Bytes>;

    /// Append `chunk` to a writable body.
    fn body_write(&mut self, body: BodyHandle, chunk: &[u8]) -> HostResult<()>;

    /// Move the whole content of `src` onto the end of `dest`. `src` is
    /// consumed.
    fn body_append(&mut self, dest: BodyHandle, src: BodyHandle) -> HostResult<()>;

    /// Flush and close a body.
    fn body_close(&mut self, body: BodyHandle) -> HostResult<()>;

    /// Terminate a body without flushing.
    fn body_abandon(&mut self, body: BodyHandle) -> HostResult<()>;

    /// Open a key-value object store by name.
    fn object_store_open(&mut self, name: &str) -> HostResult<ObjectStoreHandle>;

    /// Look up a key; the value comes back as a readable body.
    fn object_store_lookup(&mut self, store: ObjectStoreHandle, key: &str)
        -> HostResult<BodyHandle>;

    /// Store the content of `body` under `key`. `body` is consumed.
    fn object_store_insert(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
        body: BodyHandle,
    ) -> HostResult<()>;
}

impl<T: Host + ?Sized> Host for &mut T {
    fn dictionary_open(&mut self, name: &str) -> HostResult<DictionaryHandle> {
        (**self).dictionary_open(name)
    }

    fn dictionary_get(&mut self, dict: DictionaryHandle, key: &str) -> HostResult<String> {
        (**self).dictionary_get(dict, key)
    }

    fn log_endpoint_open(&mut self, name: &str) -> HostResult<LogEndpointHandle> {
        (**self).log_endpoint_open(name)
    }

    fn log_write(&mut self, endpoint: LogEndpointHandle, message: &str) -> HostResult<()> {
        (**self).log_write(endpoint, message)
    }

    fn body_new(&mut self) -> HostResult<BodyHandle> {
        (**self).body_new()
    }

    fn body_read(&mut self, body: BodyHandle, max_len: usize) -> HostResult<Bytes> {
        (**self).body_read(body, max_len)
    }

    fn body_write(&mut self, body: BodyHandle, chunk: &[u8]) -> HostResult<()> {
        (**self).body_write(body, chunk)
    }

    fn body_append(&mut self, dest: BodyHandle, src: BodyHandle) -> HostResult<()> {
        (**self).body_append(dest, src)
    }

    fn body_close(&mut self, body: BodyHandle) -> HostResult<()> {
        (**self).body_close(body)
    }

    fn body_abandon(&mut self, body: BodyHandle) -> HostResult<()> {
        (**self).body_abandon(body)
    }

    fn object_store_open(&mut self, name: &str) -> HostResult<ObjectStoreHandle> {
        (**self).object_store_open(name)
    }

    fn object_store_lookup(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
    ) -> HostResult<BodyHandle> {
        (**self).object_store_lookup(store, key)
    }

    fn object_store_insert(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
        body: BodyHandle,
    ) -> HostResult<()> {
        (**self).object_store_insert(store, key, body)
    }
}

impl<T: Host + ?Sized> Host for Box<T> {
    fn dictionary_open(&mut self, name: &str) -> HostResult<DictionaryHandle> {
        self.as_mut().dictionary_open(name)
    }

    fn dictionary_get(&mut self, dict: DictionaryHandle, key: &str) -> HostResult<String> {
        self.as_mut().dictionary_get(dict, key)
    }

    fn log_endpoint_open(&mut self, name: &str) -> HostResult<LogEndpointHandle> {
        self.as_mut().log_endpoint_open(name)
    }

    fn log_write(&mut self, endpoint: LogEndpointHandle, message: &str) -> HostResult<()> {
        self.as_mut().log_write(endpoint, message)
    }

    fn body_new(&mut self) -> HostResult<BodyHandle> {
        self.as_mut().body_new()
    }

    fn body_read(&mut self, body: BodyHandle, max_len: usize) -> HostResult<Bytes> {
        self.as_mut().body_read(body, max_len)
    }

    fn body_write(&mut self, body: BodyHandle, chunk: &[u8]) -> HostResult<()> {
        self.as_mut().body_write(body, chunk)
    }

    fn body_append(&mut self, dest: BodyHandle, src: BodyHandle) -> HostResult<()> {
        self.as_mut().body_append(dest, src)
    }

    fn body_close(&mut self, body: BodyHandle) -> HostResult<()> {
        self.as_mut().body_close(body)
    }

    fn body_abandon(&mut self, body: BodyHandle) -> HostResult<()> {
        self.as_mut().body_abandon(body)
    }

    fn object_store_open(&mut self, name: &str) -> HostResult<ObjectStoreHandle> {
        self.as_mut().object_store_open(name)
    }

    fn object_store_lookup(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
    ) -> HostResult<BodyHandle> {
        self.as_mut().object_store_lookup(store, key)
    }

    fn object_store_insert(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
        body: BodyHandle,
    ) -> HostResult<()> {
        self.as_mut().object_store_insert(store, key, body)
    }
}
