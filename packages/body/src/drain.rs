//! Full-body reads.

use std::fmt;

use bytes::{Bytes, BytesMut};
use edgebridge_host::Host;
use edgebridge_streams::{ReadResult, Streams};
use tracing::debug;

use crate::body::Body;
use crate::error::{BodyError, Result};

/// What a full-body read should decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Bytes,
    Text,
    Json,
    Form,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetType::Bytes => "bytes",
            TargetType::Text => "text",
            TargetType::Json => "json",
            TargetType::Form => "form",
        })
    }
}

/// A decoded body.
#[derive(Debug, Clone, PartialEq)]
pub enum Representation {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl Representation {
    pub fn target(&self) -> TargetType {
        match self {
            Representation::Bytes(_) => TargetType::Bytes,
            Representation::Text(_) => TargetType::Text,
            Representation::Json(_) => TargetType::Json,
            Representation::Form(_) => TargetType::Form,
        }
    }
}

/// Read `body` to the end and decode it as `target`.
///
/// Fails with [`BodyError::AlreadyUsed`] or [`BodyError::Locked`] without
/// touching the host if the body cannot be read. Otherwise the body is
/// marked used before the first read, so it is used afterwards even when
/// the read fails.
pub fn drain(
    streams: &mut Streams,
    host: &mut dyn Host,
    body: &mut Body,
    target: TargetType,
) -> Result<Representation> {
    if body.used {
        return Err(BodyError::AlreadyUsed);
    }
    let stream = body.stream(streams)?;
    if streams.is_locked(stream) {
        return Err(BodyError::Locked);
    }
    if streams.is_disturbed(stream) {
        return Err(BodyError::AlreadyUsed);
    }
    body.used = true;

    let data = read_all(streams, host, stream)?;
    debug!(owner = body.owner().0, %stream, len = data.len(), %target, "drained body");
    decode(data, target)
}

fn read_all(
    streams: &mut Streams,
    host: &mut dyn Host,
    stream: edgebridge_streams::ReadableId,
) -> Result<Bytes> {
    let mut guard = streams.acquire_reader(stream)?;
    let mut buf = BytesMut::new();
    let mut idle = false;
    loop {
        match guard.read(host)? {
            ReadResult::Chunk(chunk) => {
                buf.extend_from_slice(&chunk);
                idle = false;
            }
            ReadResult::Done => return Ok(buf.freeze()),
            ReadResult::Pending => {
                let progress = guard.streams().pump(host);
                if progress == 0 {
                    if idle {
                        return Err(BodyError::Stalled);
                    }
                    idle = true;
                }
            }
        }
    }
}

fn decode(data: Bytes, target: TargetType) -> Result<Representation> {
    Ok(match target {
        TargetType::Bytes => Representation::Bytes(data),
        TargetType::Text => Representation::Text(String::from_utf8_lossy(&data).into_owned()),
        TargetType::Json => Representation::Json(
            serde_json::from_slice(&data).map_err(|e| BodyError::parse(target, e))?,
        ),
        TargetType::Form => Representation::Form(
            url::form_urlencoded::parse(&data).into_owned().collect(),
        ),
    })
}
