//! Transform streams.
//!
//! A transform stream is a writable half and a readable half joined by a
//! [`TransformBridge`]. Chunks written to the writable half run through the
//! [`Transformer`] and come out of the readable half. Both halves share one
//! start signal, and an error on either half errors the other.

use bytes::Bytes;
use tracing::debug;

use crate::controller::{ReadableController, ReadableState};
use crate::error::{Result, StreamError};
use crate::id::{BridgeId, ReadableId, WritableId};
use crate::signal::StartSignal;
use crate::sink::{NativeSink, SinkState, TRANSFORM_SINK};
use crate::source::{NativeSource, SourceState, TRANSFORM_SOURCE};
use crate::streams::Streams;

/// Guest-implemented transformation.
pub trait Transformer {
    fn start(&mut self, controller: &mut TransformController<'_>) -> Result<()> {
        let _ = controller;
        Ok(())
    }

    fn transform(&mut self, chunk: Bytes, controller: &mut TransformController<'_>) -> Result<()>;

    /// Called once the writable half closes, before the readable half does.
    fn flush(&mut self, controller: &mut TransformController<'_>) -> Result<()> {
        let _ = controller;
        Ok(())
    }
}

/// Passes every chunk through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(&mut self, chunk: Bytes, controller: &mut TransformController<'_>) -> Result<()> {
        controller.enqueue(chunk)
    }
}

/// What a [`Transformer`] sees: the readable half's queue.
pub struct TransformController<'a> {
    readable: &'a mut ReadableController,
    terminated: bool,
}

impl<'a> TransformController<'a> {
    fn new(readable: &'a mut ReadableController) -> Self {
        Self {
            readable,
            terminated: false,
        }
    }

    /// Emit a chunk on the readable half.
    pub fn enqueue(&mut self, chunk: Bytes) -> Result<()> {
        self.readable.enqueue(chunk)
    }

    /// Error both halves.
    pub fn error(&mut self, error: StreamError) {
        self.readable.error(error);
        self.terminated = true;
    }

    /// Close the readable half and error the writable half.
    pub fn terminate(&mut self) {
        self.close_readable();
        self.terminated = true;
    }

    pub fn desired_size(&self) -> Option<isize> {
        self.readable.desired_size()
    }

    pub(crate) fn close_readable(&mut self) {
        if *self.readable.state() == ReadableState::Readable
            && !self.readable.is_close_requested()
        {
            let _ = self.readable.close();
        }
    }
}

/// Observable state of a transform stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Open,
    /// The readable half has been closed but still holds queued chunks.
    ReadableClosing,
    ReadableClosed,
    Errored,
}

pub(crate) struct TransformBridge {
    pub(crate) readable: ReadableId,
    pub(crate) writable: WritableId,
    pub(crate) transformer: Box<dyn Transformer>,
    pub(crate) start_signal: StartSignal,
    pub(crate) errored: bool,
    /// Set by a pull on the readable half, cleared by the next write. Lets a
    /// zero high water mark still accept one chunk per read.
    pub(crate) pull_requested: bool,
}

/// The two halves of a transform stream, as held by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStream {
    pub bridge: BridgeId,
    pub readable: ReadableId,
    pub writable: WritableId,
}

impl Streams {
    /// Create a transform stream and run the transformer's `start`.
    ///
    /// If `start` fails both halves come back errored with its error rather
    /// than the call failing, so the owner can still observe and release them.
    pub fn transform(&mut self, transformer: Box<dyn Transformer>) -> TransformStream {
        let signal = StartSignal::pending();
        let high_water_mark = self.config.transform_high_water_mark;
        let (key, (readable, writable)) = {
            let sources = &mut self.sources;
            let sinks = &mut self.sinks;
            self.bridges.insert_with(|key| {
                let bridge = BridgeId(key);
                let readable = ReadableId(sources.insert(NativeSource::new(
                    &TRANSFORM_SOURCE,
                    SourceState::Transform { bridge },
                    high_water_mark,
                    signal.clone(),
                )));
                let writable = WritableId(sinks.insert(NativeSink::new(
                    &TRANSFORM_SINK,
                    SinkState::Transform { bridge },
                    0,
                    signal.clone(),
                )));
                let entry = TransformBridge {
                    readable,
                    writable,
                    transformer,
                    start_signal: signal.clone(),
                    errored: false,
                    pull_requested: false,
                };
                (entry, (readable, writable))
            })
        };
        let bridge = BridgeId(key);

        let started =
            self.with_transformer(bridge, |transformer, controller| transformer.start(controller));
        match started {
            Ok(()) => signal.resolve(),
            Err(error) => {
                debug!(%bridge, %error, "transformer start failed");
                signal.reject(error.clone());
                if let Ok(sink) = self.sink_mut(writable) {
                    sink.controller.error(error);
                }
            }
        }
        debug!(%bridge, %readable, %writable, "created transform stream");

        TransformStream {
            bridge,
            readable,
            writable,
        }
    }

    /// Shorthand for a transform stream that passes chunks through.
    pub fn identity_transform(&mut self) -> TransformStream {
        self.transform(Box::new(IdentityTransformer))
    }

    pub fn bridge_state(&self, bridge: BridgeId) -> Option<BridgeState> {
        let entry = self.bridges.get(bridge.0)?;
        if entry.errored {
            return Some(BridgeState::Errored);
        }
        let state = match self.sources.get(entry.readable.0) {
            None => BridgeState::ReadableClosed,
            Some(source) => match source.controller.state() {
                ReadableState::Errored(_) => BridgeState::Errored,
                ReadableState::Closed => BridgeState::ReadableClosed,
                ReadableState::Readable if source.controller.is_close_requested() => {
                    BridgeState::ReadableClosing
                }
                ReadableState::Readable => BridgeState::Open,
            },
        };
        Some(state)
    }

    /// True while writes to the writable half should wait for the readable
    /// half to be read.
    pub fn backpressure(&self, bridge: BridgeId) -> bool {
        let Some(entry) = self.bridges.get(bridge.0) else {
            return false;
        };
        if entry.pull_requested {
            return false;
        }
        self.sources
            .get(entry.readable.0)
            .and_then(|source| source.controller.desired_size())
            .is_some_and(|size| size <= 0)
    }

    /// Release both halves of a transform stream.
    pub fn release_transform(&mut self, stream: TransformStream) {
        self.release_readable(stream.readable);
        self.release_writable(stream.writable);
    }

    /// Run the transformer with a controller over the readable half. An
    /// error from `run` errors both halves.
    pub(crate) fn with_transformer(
        &mut self,
        bridge: BridgeId,
        run: impl FnOnce(&mut dyn Transformer, &mut TransformController<'_>) -> Result<()>,
    ) -> Result<()> {
        let entry = self.bridges.get_mut(bridge.0).ok_or(StreamError::Released)?;
        let source = self
            .sources
            .get_mut(entry.readable.0)
            .ok_or(StreamError::Released)?;
        if let ReadableState::Errored(error) = source.controller.state() {
            return Err(error.clone());
        }

        let mut controller = TransformController::new(&mut source.controller);
        let result = run(entry.transformer.as_mut(), &mut controller);
        let terminated = controller.terminated;

        let writable_error = match &result {
            Err(error) => {
                entry.errored = true;
                source.controller.error(error.clone());
                Some(error.clone())
            }
            Ok(()) if terminated => match source.controller.state() {
                ReadableState::Errored(error) => {
                    entry.errored = true;
                    Some(error.clone())
                }
                _ => Some(StreamError::Closed),
            },
            Ok(()) => None,
        };
        if let Some(error) = writable_error {
            if let Some(sink) = self.sinks.get_mut(entry.writable.0) {
                if sink.controller.state() == &crate::controller::WritableState::Writable {
                    sink.controller.error(error);
                }
            }
        }
        result
    }
}
