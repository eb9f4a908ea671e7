//! Object store builtin.

use bytes::Bytes;
use edgebridge_body::Body;
use edgebridge_host::validate;
use edgebridge_host::{BodyHandle, Host, HostOp, ObjectStoreHandle, OptionalResult};
use edgebridge_streams::Streams;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, ScriptError};

/// What can be stored under a key.
pub enum ObjectValue<'a> {
    Bytes(Bytes),
    Text(&'a str),
    /// A request or response body. Host-backed bodies are appended on the
    /// host side without passing through the guest.
    Body(&'a mut Body),
}

impl From<Bytes> for ObjectValue<'_> {
    fn from(bytes: Bytes) -> Self {
        ObjectValue::Bytes(bytes)
    }
}

impl<'a> From<&'a str> for ObjectValue<'a> {
    fn from(text: &'a str) -> Self {
        ObjectValue::Text(text)
    }
}

impl<'a> From<&'a mut Body> for ObjectValue<'a> {
    fn from(body: &'a mut Body) -> Self {
        ObjectValue::Body(body)
    }
}

/// A value found by [`ObjectStore::lookup`].
#[derive(Debug)]
pub struct ObjectStoreEntry {
    body: Body,
}

impl ObjectStoreEntry {
    pub fn body(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn body_used(&self) -> bool {
        self.body.is_used()
    }

    pub fn bytes(&mut self, streams: &mut Streams, host: &mut dyn Host) -> Result<Bytes> {
        Ok(self.body.bytes(streams, host)?)
    }

    pub fn text(&mut self, streams: &mut Streams, host: &mut dyn Host) -> Result<String> {
        Ok(self.body.text(streams, host)?)
    }

    pub fn json<T: DeserializeOwned>(
        &mut self,
        streams: &mut Streams,
        host: &mut dyn Host,
    ) -> Result<T> {
        Ok(self.body.json(streams, host)?)
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    name: String,
    handle: ObjectStoreHandle,
}

impl ObjectStore {
    pub fn open(host: &mut dyn Host, name: &str) -> Result<Self> {
        validate::object_store_name(name)?;
        match host.object_store_open(name).optional() {
            Ok(Some(handle)) => Ok(Self {
                name: name.to_string(),
                handle,
            }),
            Ok(None) => Err(ScriptError::error(format!(
                "object store '{name}' does not exist"
            ))),
            Err(error) => Err(ScriptError::host(HostOp::ObjectStoreOpen, error)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up `key`. `Ok(None)` if nothing is stored there.
    pub fn lookup(&self, host: &mut dyn Host, key: &str) -> Result<Option<ObjectStoreEntry>> {
        validate::object_store_key(key)?;
        let found = host
            .object_store_lookup(self.handle, key)
            .optional()
            .map_err(|error| ScriptError::host(HostOp::ObjectStoreLookup, error))?;
        Ok(found.map(|handle| ObjectStoreEntry {
            body: Body::from_handle(handle),
        }))
    }

    /// Store `value` under `key`, replacing what was there.
    pub fn put<'a>(
        &self,
        streams: &mut Streams,
        host: &mut dyn Host,
        key: &str,
        value: impl Into<ObjectValue<'a>>,
    ) -> Result<()> {
        validate::object_store_key(key)?;
        let body = match value.into() {
            ObjectValue::Bytes(bytes) => new_body(host, &bytes)?,
            ObjectValue::Text(text) => new_body(host, text.as_bytes())?,
            ObjectValue::Body(body) => body_for_insert(streams, host, body)?,
        };
        host.object_store_insert(self.handle, key, body)
            .map_err(|error| ScriptError::host(HostOp::ObjectStoreInsert, error))?;
        debug!(store = %self.name, key, "stored object");
        Ok(())
    }
}

fn new_body(host: &mut dyn Host, data: &[u8]) -> Result<BodyHandle> {
    let body = host
        .body_new()
        .map_err(|error| ScriptError::host(HostOp::BodyNew, error))?;
    if !data.is_empty() {
        host.body_write(body, data)
            .map_err(|error| ScriptError::host(HostOp::BodyWrite, error))?;
    }
    Ok(body)
}

fn body_for_insert(
    streams: &mut Streams,
    host: &mut dyn Host,
    body: &mut Body,
) -> Result<BodyHandle> {
    if body.is_used() {
        return Err(ScriptError::type_error("body has already been used"));
    }
    match body.handle() {
        Some(source) if body.is_host_backed(streams) => {
            let dest = new_body(host, &[])?;
            host.body_append(dest, source)
                .map_err(|error| ScriptError::host(HostOp::BodyAppend, error))?;
            body.mark_used();
            body.release(streams);
            Ok(dest)
        }
        _ => {
            let data = body.bytes(streams, host)?;
            new_body(host, &data)
        }
    }
}
