use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use edgebridge_host::{BodyHandle, Host, HostOp};
use edgebridge_streams::{OwnerKey, PipeOptions, ReadableId, StreamError, Streams};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::drain::{drain, Representation, TargetType};
use crate::error::{BodyError, Result};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// A request or response body.
#[derive(Debug)]
pub struct Body {
    owner: OwnerKey,
    handle: Option<BodyHandle>,
    stream: Option<ReadableId>,
    released: bool,
    pub(crate) used: bool,
}

impl Body {
    fn new(handle: Option<BodyHandle>, stream: Option<ReadableId>) -> Self {
        Self {
            owner: OwnerKey(NEXT_OWNER.fetch_add(1, Ordering::Relaxed)),
            handle,
            stream,
            released: false,
            used: false,
        }
    }

    /// Wrap a host body, such as an incoming request body.
    pub fn from_handle(handle: BodyHandle) -> Self {
        Self::new(Some(handle), None)
    }

    /// Wrap a guest stream.
    pub fn from_stream(streams: &mut Streams, stream: ReadableId) -> Result<Self> {
        let body = Self::new(None, Some(stream));
        streams.set_readable_owner(stream, body.owner)?;
        Ok(body)
    }

    /// Create a new host body holding `data`.
    pub fn from_bytes(host: &mut dyn Host, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let handle = host.body_new().map_err(BodyError::host(HostOp::BodyNew))?;
        if !data.is_empty() {
            host.body_write(handle, &data)
                .map_err(BodyError::host(HostOp::BodyWrite))?;
        }
        Ok(Self::from_handle(handle))
    }

    pub fn from_text(host: &mut dyn Host, text: &str) -> Result<Self> {
        Self::from_bytes(host, Bytes::copy_from_slice(text.as_bytes()))
    }

    pub fn owner(&self) -> OwnerKey {
        self.owner
    }

    /// The host body behind this body, if it has one.
    pub fn handle(&self) -> Option<BodyHandle> {
        self.handle
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    /// Mark the body consumed when its bytes were moved on the host side.
    pub fn mark_used(&mut self) {
        self.used = true;
    }

    /// True if the body still reads straight from its host handle, so the
    /// host can move its bytes without them passing through the guest.
    pub fn is_host_backed(&self, streams: &Streams) -> bool {
        if self.released {
            return false;
        }
        match (self.handle, self.stream) {
            (Some(_), None) => true,
            (Some(_), Some(stream)) => streams.is_body(stream) && !streams.is_disturbed(stream),
            (None, _) => false,
        }
    }

    /// The body's readable stream, created on first call. Creating it does
    /// not touch the host.
    ///
    /// A host body gets at most one stream. Once that stream is released or
    /// gone this fails instead of reading the handle through a second one.
    pub fn stream(&mut self, streams: &mut Streams) -> Result<ReadableId> {
        if self.released {
            return Err(match self.stream {
                Some(stream) if streams.is_locked(stream) => BodyError::Locked,
                _ => BodyError::AlreadyUsed,
            });
        }
        if let Some(stream) = self.stream {
            if streams.contains_readable(stream) {
                return Ok(stream);
            }
            return Err(BodyError::Stream(StreamError::Released));
        }
        let handle = self.handle.ok_or(BodyError::Stream(StreamError::Released))?;
        let stream = streams.body_source(handle);
        streams.set_readable_owner(stream, self.owner)?;
        self.stream = Some(stream);
        Ok(stream)
    }

    /// Re-expose the body through an identity transform. Afterwards the
    /// body's stream is the transform's readable half.
    pub fn pipe_through_identity(
        &mut self,
        streams: &mut Streams,
        host: &mut dyn Host,
    ) -> Result<ReadableId> {
        let source = self.stream(streams)?;
        let transform = streams.identity_transform();
        let readable =
            match streams.pipe_through(host, source, transform, PipeOptions::default()) {
                Ok(readable) => readable,
                Err(error) => {
                    streams.release_transform(transform);
                    return Err(error.into());
                }
            };
        streams.set_readable_owner(readable, self.owner)?;
        streams.release_readable(source);
        streams.release_writable(transform.writable);
        debug!(owner = self.owner.0, %source, %readable, "body piped through identity transform");
        self.stream = Some(readable);
        Ok(readable)
    }

    /// Let go of the body's stream. The registry frees it on the first sweep
    /// after any reader lock on it is dropped. The body cannot be read again.
    pub fn release(&mut self, streams: &mut Streams) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(stream) = self.stream {
            streams.release_readable(stream);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn bytes(&mut self, streams: &mut Streams, host: &mut dyn Host) -> Result<Bytes> {
        match drain(streams, host, self, TargetType::Bytes)? {
            Representation::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(TargetType::Bytes, &other)),
        }
    }

    pub fn text(&mut self, streams: &mut Streams, host: &mut dyn Host) -> Result<String> {
        match drain(streams, host, self, TargetType::Text)? {
            Representation::Text(text) => Ok(text),
            other => Err(unexpected(TargetType::Text, &other)),
        }
    }

    /// Read the body as JSON and deserialize it.
    pub fn json<T: DeserializeOwned>(
        &mut self,
        streams: &mut Streams,
        host: &mut dyn Host,
    ) -> Result<T> {
        match drain(streams, host, self, TargetType::Json)? {
            Representation::Json(value) => {
                serde_json::from_value(value).map_err(|e| BodyError::parse(TargetType::Json, e))
            }
            other => Err(unexpected(TargetType::Json, &other)),
        }
    }

    pub fn form(
        &mut self,
        streams: &mut Streams,
        host: &mut dyn Host,
    ) -> Result<Vec<(String, String)>> {
        match drain(streams, host, self, TargetType::Form)? {
            Representation::Form(pairs) => Ok(pairs),
            other => Err(unexpected(TargetType::Form, &other)),
        }
    }
}

fn unexpected(target: TargetType, got: &Representation) -> BodyError {
    BodyError::parse(target, format!("decoded as {}", got.target()))
}
