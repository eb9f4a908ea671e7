//! Native stream sinks.
//!
//! The writable counterpart of [`crate::source`]: body-backed sinks write to
//! a host body, script sinks delegate to a guest [`UnderlyingSink`], and
//! transform sinks feed the transformer of a transform stream.

use bytes::Bytes;
use edgebridge_host::{BodyHandle, Host, HostOp};
use tracing::debug;

use crate::controller::WritableController;
use crate::error::{Result, StreamError};
use crate::id::{BridgeId, OwnerKey, WritableId, WriterToken};
use crate::signal::StartSignal;
use crate::streams::Streams;

/// Guest-implemented consumer for a script-backed writable stream.
pub trait UnderlyingSink {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Consume one chunk. Never called while another write is running.
    fn write(&mut self, chunk: Bytes) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn abort(&mut self, reason: Option<&str>) -> Result<()> {
        let _ = reason;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Body,
    Script,
    Transform,
}

pub(crate) enum SinkState {
    Body { handle: BodyHandle },
    Script(Box<dyn UnderlyingSink>),
    Transform { bridge: BridgeId },
}

type WriteFn = fn(&mut Streams, &mut dyn Host, WritableId, Bytes) -> Result<()>;
type CloseFn = fn(&mut Streams, &mut dyn Host, WritableId) -> Result<()>;
type AbortFn = fn(&mut Streams, &mut dyn Host, WritableId, Option<&str>) -> Result<()>;

pub(crate) struct SinkAlgorithms {
    pub(crate) kind: SinkKind,
    pub(crate) write: WriteFn,
    pub(crate) close: CloseFn,
    pub(crate) abort: AbortFn,
}

pub(crate) static BODY_SINK: SinkAlgorithms = SinkAlgorithms {
    kind: SinkKind::Body,
    write: body_write,
    close: body_close,
    abort: body_abort,
};

pub(crate) static SCRIPT_SINK: SinkAlgorithms = SinkAlgorithms {
    kind: SinkKind::Script,
    write: script_write,
    close: script_close,
    abort: script_abort,
};

pub(crate) static TRANSFORM_SINK: SinkAlgorithms = SinkAlgorithms {
    kind: SinkKind::Transform,
    write: transform_write,
    close: transform_close,
    abort: transform_abort,
};

/// Registry entry for a writable stream.
pub(crate) struct NativeSink {
    pub(crate) algorithms: &'static SinkAlgorithms,
    pub(crate) state: SinkState,
    pub(crate) controller: WritableController,
    pub(crate) start_signal: StartSignal,
    pub(crate) owner: Option<OwnerKey>,
    pub(crate) writer_lock: Option<WriterToken>,
    pub(crate) released: bool,
}

impl NativeSink {
    pub(crate) fn new(
        algorithms: &'static SinkAlgorithms,
        state: SinkState,
        high_water_mark: usize,
        start_signal: StartSignal,
    ) -> Self {
        Self {
            algorithms,
            state,
            controller: WritableController::new(high_water_mark),
            start_signal,
            owner: None,
            writer_lock: None,
            released: false,
        }
    }

    pub(crate) fn kind(&self) -> SinkKind {
        self.algorithms.kind
    }

    pub(crate) fn body_handle(&self) -> Option<BodyHandle> {
        match self.state {
            SinkState::Body { handle } => Some(handle),
            _ => None,
        }
    }
}

fn body_write(
    streams: &mut Streams,
    host: &mut dyn Host,
    id: WritableId,
    chunk: Bytes,
) -> Result<()> {
    let Some(handle) = streams.sink_mut(id)?.body_handle() else {
        return Ok(());
    };
    host.body_write(handle, &chunk)
        .map_err(|e| StreamError::host(HostOp::BodyWrite, e))
}

fn body_close(streams: &mut Streams, host: &mut dyn Host, id: WritableId) -> Result<()> {
    let Some(handle) = streams.sink_mut(id)?.body_handle() else {
        return Ok(());
    };
    debug!(stream = %id, body = %handle, "closing body");
    host.body_close(handle)
        .map_err(|e| StreamError::host(HostOp::BodyClose, e))
}

fn body_abort(
    streams: &mut Streams,
    host: &mut dyn Host,
    id: WritableId,
    _reason: Option<&str>,
) -> Result<()> {
    let Some(handle) = streams.sink_mut(id)?.body_handle() else {
        return Ok(());
    };
    debug!(stream = %id, body = %handle, "abandoning aborted body");
    host.body_abandon(handle)
        .map_err(|e| StreamError::host(HostOp::BodyAbandon, e))
}

fn script_write(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: WritableId,
    chunk: Bytes,
) -> Result<()> {
    match &mut streams.sink_mut(id)?.state {
        SinkState::Script(underlying) => underlying.write(chunk),
        _ => Ok(()),
    }
}

fn script_close(streams: &mut Streams, _host: &mut dyn Host, id: WritableId) -> Result<()> {
    match &mut streams.sink_mut(id)?.state {
        SinkState::Script(underlying) => underlying.close(),
        _ => Ok(()),
    }
}

fn script_abort(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: WritableId,
    reason: Option<&str>,
) -> Result<()> {
    match &mut streams.sink_mut(id)?.state {
        SinkState::Script(underlying) => underlying.abort(reason),
        _ => Ok(()),
    }
}

fn transform_bridge(streams: &mut Streams, id: WritableId) -> Result<Option<BridgeId>> {
    Ok(match streams.sink_mut(id)?.state {
        SinkState::Transform { bridge } => Some(bridge),
        _ => None,
    })
}

fn transform_write(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: WritableId,
    chunk: Bytes,
) -> Result<()> {
    let Some(bridge) = transform_bridge(streams, id)? else {
        return Ok(());
    };
    streams.bridge_mut(bridge)?.pull_requested = false;
    streams.with_transformer(bridge, |transformer, controller| {
        transformer.transform(chunk, controller)
    })
}

fn transform_close(streams: &mut Streams, _host: &mut dyn Host, id: WritableId) -> Result<()> {
    let Some(bridge) = transform_bridge(streams, id)? else {
        return Ok(());
    };
    debug!(stream = %id, %bridge, "flushing transformer");
    streams.with_transformer(bridge, |transformer, controller| {
        transformer.flush(controller)?;
        controller.close_readable();
        Ok(())
    })
}

fn transform_abort(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: WritableId,
    _reason: Option<&str>,
) -> Result<()> {
    let Some(bridge) = transform_bridge(streams, id)? else {
        return Ok(());
    };
    let readable = {
        let entry = streams.bridge_mut(bridge)?;
        entry.errored = true;
        entry.readable
    };
    debug!(stream = %id, %bridge, "transform writable aborted; erroring readable half");
    if let Ok(source) = streams.source_mut(readable) {
        source.controller.error(StreamError::Aborted);
    }
    Ok(())
}
