//! Native stream sources.
//!
//! A [`NativeSource`] is the registry entry behind every readable stream. Its
//! behavior comes from a static [`SourceAlgorithms`] table chosen at
//! construction: body-backed sources read from a host body, script sources
//! delegate to a guest [`UnderlyingSource`], and transform sources are the
//! readable half of a transform stream.

use edgebridge_host::{BodyHandle, Host, HostOp};
use tracing::debug;

use crate::controller::ReadableController;
use crate::error::{Result, StreamError};
use crate::id::{BridgeId, OwnerKey, ReadableId, ReaderToken, WritableId};
use crate::signal::StartSignal;
use crate::streams::Streams;

/// Guest-implemented producer for a script-backed readable stream.
pub trait UnderlyingSource {
    /// Called once when the stream is created.
    fn start(&mut self, controller: &mut ReadableController) -> Result<()> {
        let _ = controller;
        Ok(())
    }

    /// Called whenever the stream wants more data.
    fn pull(&mut self, controller: &mut ReadableController) -> Result<()>;

    /// Called when the consumer cancels.
    fn cancel(&mut self, reason: Option<&str>) -> Result<()> {
        let _ = reason;
        Ok(())
    }
}

/// Which algorithm table drives a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Body,
    Script,
    Transform,
}

pub(crate) enum SourceState {
    Body {
        handle: BodyHandle,
        chunk_size: usize,
    },
    Script(Box<dyn UnderlyingSource>),
    Transform {
        bridge: BridgeId,
    },
}

type PullFn = fn(&mut Streams, &mut dyn Host, ReadableId) -> Result<()>;
type CancelFn = fn(&mut Streams, &mut dyn Host, ReadableId, Option<&str>) -> Result<()>;

/// One function table per source kind, shared by every source of that kind.
pub(crate) struct SourceAlgorithms {
    pub(crate) kind: SourceKind,
    pub(crate) pull: PullFn,
    pub(crate) cancel: CancelFn,
}

pub(crate) static BODY_SOURCE: SourceAlgorithms = SourceAlgorithms {
    kind: SourceKind::Body,
    pull: body_pull,
    cancel: body_cancel,
};

pub(crate) static SCRIPT_SOURCE: SourceAlgorithms = SourceAlgorithms {
    kind: SourceKind::Script,
    pull: script_pull,
    cancel: script_cancel,
};

pub(crate) static TRANSFORM_SOURCE: SourceAlgorithms = SourceAlgorithms {
    kind: SourceKind::Transform,
    pull: transform_pull,
    cancel: transform_cancel,
};

/// Registry entry for a readable stream.
pub(crate) struct NativeSource {
    pub(crate) algorithms: &'static SourceAlgorithms,
    pub(crate) state: SourceState,
    pub(crate) controller: ReadableController,
    pub(crate) start_signal: StartSignal,
    pub(crate) owner: Option<OwnerKey>,
    pub(crate) reader_lock: Option<ReaderToken>,
    /// Weak: only meaningful while the writable still resolves.
    pub(crate) piped_to: Option<WritableId>,
    pub(crate) pulling: bool,
    pub(crate) pull_again: bool,
    pub(crate) canceled: bool,
    pub(crate) disturbed: bool,
    pub(crate) released: bool,
}

impl NativeSource {
    pub(crate) fn new(
        algorithms: &'static SourceAlgorithms,
        state: SourceState,
        high_water_mark: usize,
        start_signal: StartSignal,
    ) -> Self {
        Self {
            algorithms,
            state,
            controller: ReadableController::new(high_water_mark),
            start_signal,
            owner: None,
            reader_lock: None,
            piped_to: None,
            pulling: false,
            pull_again: false,
            canceled: false,
            disturbed: false,
            released: false,
        }
    }

    pub(crate) fn kind(&self) -> SourceKind {
        self.algorithms.kind
    }

    pub(crate) fn body_handle(&self) -> Option<BodyHandle> {
        match self.state {
            SourceState::Body { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

fn body_pull(streams: &mut Streams, host: &mut dyn Host, id: ReadableId) -> Result<()> {
    let source = streams.source_mut(id)?;
    let SourceState::Body { handle, chunk_size } = source.state else {
        return Ok(());
    };
    let chunk = host
        .body_read(handle, chunk_size)
        .map_err(|e| StreamError::host(HostOp::BodyRead, e))?;
    if chunk.is_empty() {
        debug!(stream = %id, body = %handle, "body source reached end of body");
        source.controller.close()
    } else {
        source.controller.enqueue(chunk)
    }
}

fn body_cancel(
    streams: &mut Streams,
    host: &mut dyn Host,
    id: ReadableId,
    _reason: Option<&str>,
) -> Result<()> {
    let source = streams.source_mut(id)?;
    let Some(handle) = source.body_handle() else {
        return Ok(());
    };
    debug!(stream = %id, body = %handle, "abandoning canceled body");
    host.body_abandon(handle)
        .map_err(|e| StreamError::host(HostOp::BodyAbandon, e))
}

fn script_pull(streams: &mut Streams, _host: &mut dyn Host, id: ReadableId) -> Result<()> {
    let source = streams.source_mut(id)?;
    match &mut source.state {
        SourceState::Script(underlying) => underlying.pull(&mut source.controller),
        _ => Ok(()),
    }
}

fn script_cancel(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: ReadableId,
    reason: Option<&str>,
) -> Result<()> {
    let source = streams.source_mut(id)?;
    match &mut source.state {
        SourceState::Script(underlying) => underlying.cancel(reason),
        _ => Ok(()),
    }
}

/// The readable half produces data only when the writable half is written,
/// so a pull just lets whatever feeds the writable half make progress.
fn transform_pull(streams: &mut Streams, host: &mut dyn Host, id: ReadableId) -> Result<()> {
    let SourceState::Transform { bridge } = streams.source_mut(id)?.state else {
        return Ok(());
    };
    let writable = {
        let entry = streams.bridge_mut(bridge)?;
        entry.pull_requested = true;
        entry.writable
    };
    if let Some(pipe) = streams.pipe_into(writable) {
        streams.pump_pipe(host, pipe);
    }
    Ok(())
}

fn transform_cancel(
    streams: &mut Streams,
    _host: &mut dyn Host,
    id: ReadableId,
    _reason: Option<&str>,
) -> Result<()> {
    let SourceState::Transform { bridge } = streams.source_mut(id)?.state else {
        return Ok(());
    };
    let writable = {
        let entry = streams.bridge_mut(bridge)?;
        entry.errored = true;
        entry.writable
    };
    debug!(stream = %id, %bridge, "transform readable canceled; erroring writable half");
    if let Ok(sink) = streams.sink_mut(writable) {
        sink.controller.error(StreamError::Canceled);
    }
    Ok(())
}
