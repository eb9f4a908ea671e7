//! Deterministic in-memory host.
//!
//! `InMemoryHost` stands in for the platform in tests and local runs. It
//! keeps dictionaries, log endpoints, bodies and object stores in plain
//! maps, records every call it receives, and can be told to fail specific
//! operations.

use std::collections::{BTreeMap, VecDeque};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{HostError, HostResult};
use crate::handle::{
    AnyHandle, BodyHandle, DictionaryHandle, LogEndpointHandle, ObjectStoreHandle, ResourceHandle,
};
use crate::host::{Host, HostOp};

/// One recorded host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    /// The operation invoked.
    pub op: HostOp,
    /// The handle the call targeted, if any.
    pub handle: Option<AnyHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Open,
    Closed,
    Abandoned,
}

#[derive(Debug)]
struct MemBody {
    data: BytesMut,
    read_pos: usize,
    state: BodyState,
}

impl MemBody {
    fn readable(data: Bytes) -> Self {
        Self {
            data: BytesMut::from(&data[..]),
            read_pos: 0,
            state: BodyState::Closed,
        }
    }

    fn writable() -> Self {
        Self {
            data: BytesMut::new(),
            read_pos: 0,
            state: BodyState::Open,
        }
    }

    fn unread(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data[self.read_pos..])
    }
}

/// A host whose resources live in memory.
///
/// # Example
///
/// ```rust
/// use edgebridge_host::{Host, HostError, HostOp, InMemoryHost};
///
/// let mut host = InMemoryHost::new().with_chunk_size(4);
/// let body = host.add_body("hello world");
///
/// assert_eq!(&host.body_read(body, 1024).unwrap()[..], b"hell");
/// assert_eq!(host.call_count(HostOp::BodyRead), 1);
///
/// host.fail_next(HostOp::BodyRead, HostError::BadHandle);
/// assert_eq!(host.body_read(body, 1024), Err(HostError::BadHandle));
/// ```
#[derive(Debug)]
pub struct InMemoryHost {
    chunk_size: usize,
    next_handle: u32,

    dictionary_names: BTreeMap<String, BTreeMap<String, String>>,
    dictionaries: BTreeMap<u32, String>,

    log_names: BTreeMap<String, u32>,
    logs: BTreeMap<u32, (String, Vec<String>)>,

    bodies: BTreeMap<u32, MemBody>,

    object_store_names: BTreeMap<String, BTreeMap<String, Bytes>>,
    object_stores: BTreeMap<u32, String>,

    calls: Vec<HostCall>,
    fail_next: VecDeque<(HostOp, HostError)>,
    fail_always: BTreeMap<HostOp, HostError>,
}

impl InMemoryHost {
    /// Default maximum bytes returned by one `body_read`.
    pub const DEFAULT_CHUNK_SIZE: usize = 8192;

    /// Create an empty host.
    pub fn new() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            next_handle: 1,
            dictionary_names: BTreeMap::new(),
            dictionaries: BTreeMap::new(),
            log_names: BTreeMap::new(),
            logs: BTreeMap::new(),
            bodies: BTreeMap::new(),
            object_store_names: BTreeMap::new(),
            object_stores: BTreeMap::new(),
            calls: Vec::new(),
            fail_next: VecDeque::new(),
            fail_always: BTreeMap::new(),
        }
    }

    /// Cap every `body_read` at `chunk_size` bytes, regardless of the
    /// caller's buffer size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    // === Fixtures ===

    /// Register a dictionary with its entries.
    pub fn add_dictionary<K, V>(&mut self, name: &str, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.dictionary_names.insert(name.to_string(), map);
    }

    /// Register an object store with its entries.
    pub fn add_object_store<K, V>(&mut self, name: &str, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Bytes>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.object_store_names.insert(name.to_string(), map);
    }

    /// Create a readable body (for example an incoming request body).
    pub fn add_body(&mut self, data: impl Into<Bytes>) -> BodyHandle {
        let handle = self.alloc();
        self.bodies.insert(handle, MemBody::readable(data.into()));
        BodyHandle::from_raw(handle)
    }

    // === Fault injection ===

    /// Make the next call to `op` fail with `error`.
    pub fn fail_next(&mut self, op: HostOp, error: HostError) {
        self.fail_next.push_back((op, error));
    }

    /// Make every call to `op` fail with `error` until cleared.
    pub fn fail_always(&mut self, op: HostOp, error: HostError) {
        self.fail_always.insert(op, error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&mut self) {
        self.fail_next.clear();
        self.fail_always.clear();
    }

    // === Inspection ===

    /// Every call received, in order.
    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    /// Number of calls received for `op`.
    pub fn call_count(&self, op: HostOp) -> usize {
        self.calls.iter().filter(|c| c.op == op).count()
    }

    /// Total number of calls received.
    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Full content of a body, including bytes already read.
    pub fn body_contents(&self, body: BodyHandle) -> Option<Bytes> {
        self.bodies
            .get(&body.as_raw())
            .map(|b| Bytes::copy_from_slice(&b.data))
    }

    /// True once `body_close` succeeded on a writable body.
    pub fn body_is_closed(&self, body: BodyHandle) -> bool {
        self.bodies
            .get(&body.as_raw())
            .is_some_and(|b| b.state == BodyState::Closed)
    }

    /// True once `body_abandon` succeeded.
    pub fn body_is_abandoned(&self, body: BodyHandle) -> bool {
        self.bodies
            .get(&body.as_raw())
            .is_some_and(|b| b.state == BodyState::Abandoned)
    }

    /// Lines written to a log endpoint, by endpoint name.
    pub fn log_lines(&self, name: &str) -> Vec<String> {
        self.log_names
            .get(name)
            .and_then(|h| self.logs.get(h))
            .map(|(_, lines)| lines.clone())
            .unwrap_or_default()
    }

    /// Value stored in an object store, by store name and key.
    pub fn object(&self, store: &str, key: &str) -> Option<Bytes> {
        self.object_store_names
            .get(store)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    // === Internals ===

    fn alloc(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn begin(&mut self, op: HostOp, handle: Option<AnyHandle>) -> HostResult<()> {
        self.calls.push(HostCall { op, handle });
        if let Some(error) = self.fail_always.get(&op) {
            debug!(%op, %error, "injected host failure");
            return Err(*error);
        }
        if let Some(pos) = self.fail_next.iter().position(|(o, _)| *o == op) {
            if let Some((_, error)) = self.fail_next.remove(pos) {
                debug!(%op, %error, once = true, "injected host failure");
                return Err(error);
            }
        }
        Ok(())
    }

    fn body_mut(&mut self, body: BodyHandle) -> HostResult<&mut MemBody> {
        self.bodies
            .get_mut(&body.as_raw())
            .ok_or(HostError::BadHandle)
    }

    fn store_name(&self, store: ObjectStoreHandle) -> HostResult<String> {
        self.object_stores
            .get(&store.as_raw())
            .cloned()
            .ok_or(HostError::BadHandle)
    }

    fn take_body(&mut self, body: BodyHandle) -> HostResult<Bytes> {
        match self.bodies.get(&body.as_raw()) {
            Some(b) if b.state != BodyState::Abandoned => {}
            _ => return Err(HostError::BadHandle),
        }
        let taken = self
            .bodies
            .remove(&body.as_raw())
            .ok_or(HostError::BadHandle)?;
        Ok(taken.unread())
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for InMemoryHost {
    fn dictionary_open(&mut self, name: &str) -> HostResult<DictionaryHandle> {
        self.begin(HostOp::DictionaryOpen, None)?;
        if !self.dictionary_names.contains_key(name) {
            return Err(HostError::OptionalNone);
        }
        let handle = self.alloc();
        self.dictionaries.insert(handle, name.to_string());
        Ok(DictionaryHandle::from_raw(handle))
    }

    fn dictionary_get(&mut self, dict: DictionaryHandle, key: &str) -> HostResult<String> {
        self.begin(HostOp::DictionaryGet, Some(dict.erase()))?;
        let name = self
            .dictionaries
            .get(&dict.as_raw())
            .ok_or(HostError::BadHandle)?;
        self.dictionary_names
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or(HostError::OptionalNone)
    }

    fn log_endpoint_open(&mut self, name: &str) -> HostResult<LogEndpointHandle> {
        self.begin(HostOp::LogEndpointOpen, None)?;
        if let Some(handle) = self.log_names.get(name) {
            return Ok(LogEndpointHandle::from_raw(*handle));
        }
        let handle = self.alloc();
        self.log_names.insert(name.to_string(), handle);
        self.logs.insert(handle, (name.to_string(), Vec::new()));
        Ok(LogEndpointHandle::from_raw(handle))
    }

    fn log_write(&mut self, endpoint: LogEndpointHandle, message: &str) -> HostResult<()> {
        self.begin(HostOp::LogWrite, Some(endpoint.erase()))?;
        let (_, lines) = self
            .logs
            .get_mut(&endpoint.as_raw())
            .ok_or(HostError::BadHandle)?;
        lines.push(message.to_string());
        Ok(())
    }

    fn body_new(&mut self) -> HostResult<BodyHandle> {
        self.begin(HostOp::BodyNew, None)?;
        let handle = self.alloc();
        self.bodies.insert(handle, MemBody::writable());
        Ok(BodyHandle::from_raw(handle))
    }

    fn body_read(&mut self, body: BodyHandle, max_len: usize) -> HostResult<Bytes> {
        self.begin(HostOp::BodyRead, Some(body.erase()))?;
        let chunk_size = self.chunk_size;
        let b = self.body_mut(body)?;
        if b.state == BodyState::Abandoned {
            return Err(HostError::BadHandle);
        }
        let end = (b.read_pos + max_len.min(chunk_size)).min(b.data.len());
        let chunk = Bytes::copy_from_slice(&b.data[b.read_pos..end]);
        b.read_pos = end;
        Ok(chunk)
    }

    fn body_write(&mut self, body: BodyHandle, chunk: &[u8]) -> HostResult<()> {
        self.begin(HostOp::BodyWrite, Some(body.erase()))?;
        let b = self.body_mut(body)?;
        if b.state != BodyState::Open {
            return Err(HostError::BadHandle);
        }
        b.data.extend_from_slice(chunk);
        Ok(())
    }

    fn body_append(&mut self, dest: BodyHandle, src: BodyHandle) -> HostResult<()> {
        self.begin(HostOp::BodyAppend, Some(dest.erase()))?;
        if dest == src {
            return Err(HostError::InvalidArgument);
        }
        if self.body_mut(dest)?.state != BodyState::Open {
            return Err(HostError::BadHandle);
        }
        let data = self.take_body(src)?;
        self.body_mut(dest)?.data.extend_from_slice(&data);
        Ok(())
    }

    fn body_close(&mut self, body: BodyHandle) -> HostResult<()> {
        self.begin(HostOp::BodyClose, Some(body.erase()))?;
        let b = self.body_mut(body)?;
        if b.state != BodyState::Open {
            return Err(HostError::BadHandle);
        }
        b.state = BodyState::Closed;
        Ok(())
    }

    fn body_abandon(&mut self, body: BodyHandle) -> HostResult<()> {
        self.begin(HostOp::BodyAbandon, Some(body.erase()))?;
        let b = self.body_mut(body)?;
        if b.state == BodyState::Abandoned {
            return Err(HostError::BadHandle);
        }
        b.state = BodyState::Abandoned;
        Ok(())
    }

    fn object_store_open(&mut self, name: &str) -> HostResult<ObjectStoreHandle> {
        self.begin(HostOp::ObjectStoreOpen, None)?;
        if !self.object_store_names.contains_key(name) {
            return Err(HostError::OptionalNone);
        }
        let handle = self.alloc();
        self.object_stores.insert(handle, name.to_string());
        Ok(ObjectStoreHandle::from_raw(handle))
    }

    fn object_store_lookup(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
    ) -> HostResult<BodyHandle> {
        self.begin(HostOp::ObjectStoreLookup, Some(store.erase()))?;
        let name = self.store_name(store)?;
        let value = self
            .object_store_names
            .get(&name)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or(HostError::OptionalNone)?;
        let handle = self.alloc();
        self.bodies.insert(handle, MemBody::readable(value));
        Ok(BodyHandle::from_raw(handle))
    }

    fn object_store_insert(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
        body: BodyHandle,
    ) -> HostResult<()> {
        self.begin(HostOp::ObjectStoreInsert, Some(store.erase()))?;
        let name = self.store_name(store)?;
        let data = self.take_body(body)?;
        self.object_store_names
            .entry(name)
            .or_default()
            .insert(key.to_string(), data);
        Ok(())
    }
}
