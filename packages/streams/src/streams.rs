//! The stream registry.
//!
//! [`Streams`] owns every native source, native sink, transform bridge and
//! pipe. Guest code holds only ids; all operations go through the registry,
//! and any that may reach the host take the host as a parameter.

use bytes::Bytes;
use edgebridge_host::{BodyHandle, Host};
use tracing::{debug, warn};

use crate::arena::Arena;
use crate::config::StreamConfig;
use crate::controller::{ReadableState, WritableState};
use crate::error::{Result, StreamError};
use crate::id::{BridgeId, OwnerKey, PipeId, ReadableId, ReaderToken, WritableId, WriterToken};
use crate::lock::ReaderGuard;
use crate::pipe::{PipeOptions, PipeState, PipeTask};
use crate::signal::{SignalState, StartSignal};
use crate::sink::{NativeSink, SinkKind, SinkState, UnderlyingSink, BODY_SINK, SCRIPT_SINK};
use crate::source::{
    NativeSource, SourceKind, SourceState, UnderlyingSource, BODY_SOURCE, SCRIPT_SOURCE,
};
use crate::transform::{TransformBridge, TransformStream};

/// Outcome of a single read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Chunk(Bytes),
    /// The stream closed and every chunk has been delivered.
    Done,
    /// Nothing is available yet; something else has to make progress first.
    Pending,
}

/// Registry of streams for one guest instance.
pub struct Streams {
    pub(crate) config: StreamConfig,
    pub(crate) sources: Arena<NativeSource>,
    pub(crate) sinks: Arena<NativeSink>,
    pub(crate) bridges: Arena<TransformBridge>,
    pub(crate) pipes: Arena<PipeTask>,
    next_token: u64,
}

impl Default for Streams {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

fn log_stream_error(stream: &dyn std::fmt::Display, error: &StreamError, what: &str) {
    if error.host_error().is_some() {
        warn!(stream = %stream, %error, "{what} failed; stream errored");
    } else {
        debug!(stream = %stream, %error, "{what} failed; stream errored");
    }
}

impl Streams {
    /// A zero `body_chunk_size` is raised to 1; a zero-length `body_read`
    /// would be indistinguishable from end of stream.
    pub fn new(mut config: StreamConfig) -> Self {
        config.body_chunk_size = config.body_chunk_size.max(1);
        Self {
            config,
            sources: Arena::new(),
            sinks: Arena::new(),
            bridges: Arena::new(),
            pipes: Arena::new(),
            next_token: 1,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    // === Construction ===

    /// A readable stream over a host body. The body is read lazily, one
    /// `body_read` per pull.
    pub fn body_source(&mut self, handle: BodyHandle) -> ReadableId {
        let state = SourceState::Body {
            handle,
            chunk_size: self.config.body_chunk_size,
        };
        let source = NativeSource::new(
            &BODY_SOURCE,
            state,
            self.config.body_high_water_mark,
            StartSignal::resolved(),
        );
        let id = ReadableId(self.sources.insert(source));
        debug!(stream = %id, body = %handle, "created body source");
        id
    }

    /// A readable stream driven by guest code. A failing `start` leaves the
    /// stream errored.
    pub fn script_source(
        &mut self,
        underlying: Box<dyn UnderlyingSource>,
        high_water_mark: usize,
    ) -> ReadableId {
        let mut source = NativeSource::new(
            &SCRIPT_SOURCE,
            SourceState::Script(underlying),
            high_water_mark,
            StartSignal::resolved(),
        );
        if let SourceState::Script(underlying) = &mut source.state {
            if let Err(error) = underlying.start(&mut source.controller) {
                source.controller.error(error);
            }
        }
        ReadableId(self.sources.insert(source))
    }

    /// A writable stream over a host body opened for writing.
    pub fn body_sink(&mut self, handle: BodyHandle) -> WritableId {
        let sink = NativeSink::new(
            &BODY_SINK,
            SinkState::Body { handle },
            self.config.body_chunk_size,
            StartSignal::resolved(),
        );
        let id = WritableId(self.sinks.insert(sink));
        debug!(stream = %id, body = %handle, "created body sink");
        id
    }

    pub fn script_sink(&mut self, underlying: Box<dyn UnderlyingSink>) -> WritableId {
        let mut sink = NativeSink::new(
            &SCRIPT_SINK,
            SinkState::Script(underlying),
            self.config.body_chunk_size,
            StartSignal::resolved(),
        );
        if let SinkState::Script(underlying) = &mut sink.state {
            if let Err(error) = underlying.start() {
                sink.controller.error(error);
            }
        }
        WritableId(self.sinks.insert(sink))
    }

    // === Ownership ===

    pub fn set_readable_owner(&mut self, id: ReadableId, owner: OwnerKey) -> Result<()> {
        self.source_mut(id)?.owner = Some(owner);
        Ok(())
    }

    pub fn set_writable_owner(&mut self, id: WritableId, owner: OwnerKey) -> Result<()> {
        self.sink_mut(id)?.owner = Some(owner);
        Ok(())
    }

    pub fn readable_owner(&self, id: ReadableId) -> Option<OwnerKey> {
        self.sources.get(id.0)?.owner
    }

    pub fn writable_owner(&self, id: WritableId) -> Option<OwnerKey> {
        self.sinks.get(id.0)?.owner
    }

    /// The owner is done with this stream. It is removed by the next
    /// [`sweep`](Self::sweep) once no reader or pipe holds it.
    pub fn release_readable(&mut self, id: ReadableId) {
        if let Some(source) = self.sources.get_mut(id.0) {
            source.released = true;
            source.owner = None;
        }
    }

    pub fn release_writable(&mut self, id: WritableId) {
        if let Some(sink) = self.sinks.get_mut(id.0) {
            sink.released = true;
            sink.owner = None;
        }
    }

    // === Queries ===

    pub fn contains_readable(&self, id: ReadableId) -> bool {
        self.sources.contains(id.0)
    }

    pub fn contains_writable(&self, id: WritableId) -> bool {
        self.sinks.contains(id.0)
    }

    pub fn source_kind(&self, id: ReadableId) -> Option<SourceKind> {
        Some(self.sources.get(id.0)?.kind())
    }

    pub fn sink_kind(&self, id: WritableId) -> Option<SinkKind> {
        Some(self.sinks.get(id.0)?.kind())
    }

    /// True if the stream is backed by the runtime rather than guest code.
    pub fn has_native_source(&self, id: ReadableId) -> bool {
        self.source_kind(id)
            .is_some_and(|kind| kind != SourceKind::Script)
    }

    /// True if the stream reads directly from a host body.
    pub fn is_body(&self, id: ReadableId) -> bool {
        self.source_kind(id) == Some(SourceKind::Body)
    }

    pub fn body_handle(&self, id: ReadableId) -> Option<BodyHandle> {
        self.sources.get(id.0)?.body_handle()
    }

    pub fn sink_body_handle(&self, id: WritableId) -> Option<BodyHandle> {
        self.sinks.get(id.0)?.body_handle()
    }

    pub fn is_locked(&self, id: ReadableId) -> bool {
        self.sources
            .get(id.0)
            .is_some_and(|source| source.reader_lock.is_some())
    }

    pub fn is_writable_locked(&self, id: WritableId) -> bool {
        self.sinks
            .get(id.0)
            .is_some_and(|sink| sink.writer_lock.is_some())
    }

    /// True once anything has read from or canceled the stream.
    pub fn is_disturbed(&self, id: ReadableId) -> bool {
        self.sources
            .get(id.0)
            .is_some_and(|source| source.disturbed)
    }

    pub fn readable_state(&self, id: ReadableId) -> Option<ReadableState> {
        Some(self.sources.get(id.0)?.controller.state().clone())
    }

    pub fn writable_state(&self, id: WritableId) -> Option<WritableState> {
        Some(self.sinks.get(id.0)?.controller.state().clone())
    }

    pub fn desired_size(&self, id: WritableId) -> Option<isize> {
        self.sinks.get(id.0)?.controller.desired_size()
    }

    /// The writable this stream is being piped into, if both still exist.
    pub fn piped_to(&self, id: ReadableId) -> Option<WritableId> {
        self.sources
            .get(id.0)?
            .piped_to
            .filter(|dest| self.sinks.contains(dest.0))
    }

    pub fn readable_count(&self) -> usize {
        self.sources.len()
    }

    pub fn writable_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    // === Reading ===

    /// Take the reader lock. Fails with [`StreamError::Locked`] if a reader
    /// or pipe already holds it.
    pub fn get_reader(&mut self, id: ReadableId) -> Result<ReaderToken> {
        let token = ReaderToken(self.next_token);
        let source = self.source_mut(id)?;
        if source.reader_lock.is_some() {
            return Err(StreamError::Locked);
        }
        source.reader_lock = Some(token);
        self.next_token += 1;
        Ok(token)
    }

    /// Take the reader lock for the lifetime of the returned guard.
    pub fn acquire_reader(&mut self, id: ReadableId) -> Result<ReaderGuard<'_>> {
        let token = self.get_reader(id)?;
        Ok(ReaderGuard::new(self, id, token))
    }

    pub fn release_reader(&mut self, id: ReadableId, token: ReaderToken) -> Result<()> {
        self.check_reader(id, Some(token))?;
        self.source_mut(id)?.reader_lock = None;
        Ok(())
    }

    /// Read from an unlocked stream.
    pub fn read(&mut self, host: &mut dyn Host, id: ReadableId) -> Result<ReadResult> {
        self.check_reader(id, None)?;
        self.read_inner(host, id)
    }

    pub fn read_with(
        &mut self,
        host: &mut dyn Host,
        id: ReadableId,
        token: ReaderToken,
    ) -> Result<ReadResult> {
        self.check_reader(id, Some(token))?;
        self.read_inner(host, id)
    }

    /// Cancel an unlocked stream. Body-backed streams abandon their body.
    pub fn cancel(
        &mut self,
        host: &mut dyn Host,
        id: ReadableId,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check_reader(id, None)?;
        self.cancel_inner(host, id, reason)
    }

    pub fn cancel_with(
        &mut self,
        host: &mut dyn Host,
        id: ReadableId,
        token: ReaderToken,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check_reader(id, Some(token))?;
        self.cancel_inner(host, id, reason)
    }

    // === Writing ===

    pub fn get_writer(&mut self, id: WritableId) -> Result<WriterToken> {
        let token = WriterToken(self.next_token);
        let sink = self.sink_mut(id)?;
        if sink.writer_lock.is_some() {
            return Err(StreamError::Locked);
        }
        sink.writer_lock = Some(token);
        self.next_token += 1;
        Ok(token)
    }

    pub fn release_writer(&mut self, id: WritableId, token: WriterToken) -> Result<()> {
        self.check_writer(id, Some(token))?;
        self.sink_mut(id)?.writer_lock = None;
        Ok(())
    }

    /// Queue a chunk. Writes reach the sink one at a time, in order.
    pub fn write(&mut self, host: &mut dyn Host, id: WritableId, chunk: Bytes) -> Result<()> {
        self.check_writer(id, None)?;
        self.write_inner(host, id, chunk)
    }

    pub fn write_with(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        token: WriterToken,
        chunk: Bytes,
    ) -> Result<()> {
        self.check_writer(id, Some(token))?;
        self.write_inner(host, id, chunk)
    }

    /// Close after queued writes drain. Closing a closing or closed stream
    /// succeeds without reaching the sink again.
    pub fn close(&mut self, host: &mut dyn Host, id: WritableId) -> Result<()> {
        self.check_writer(id, None)?;
        self.close_inner(host, id)
    }

    pub fn close_with(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        token: WriterToken,
    ) -> Result<()> {
        self.check_writer(id, Some(token))?;
        self.close_inner(host, id)
    }

    /// Abort, discarding queued writes. Wins over a pending close; a second
    /// abort is a no-op.
    pub fn abort(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check_writer(id, None)?;
        self.abort_inner(host, id, reason)
    }

    pub fn abort_with(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        token: WriterToken,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check_writer(id, Some(token))?;
        self.abort_inner(host, id, reason)
    }

    // === Piping ===

    /// Pipe `source` into `dest`. Both are locked until the pipe finishes.
    /// The pipe runs as far as it can before returning; call
    /// [`pump`](Self::pump) to drive it further.
    pub fn pipe_to(
        &mut self,
        host: &mut dyn Host,
        source: ReadableId,
        dest: WritableId,
        options: PipeOptions,
    ) -> Result<PipeId> {
        let reader = self.get_reader(source)?;
        let writer = match self.get_writer(dest) {
            Ok(writer) => writer,
            Err(error) => {
                let _ = self.release_reader(source, reader);
                return Err(error);
            }
        };
        let entry = self.source_mut(source)?;
        entry.piped_to = Some(dest);
        entry.disturbed = true;

        let id = PipeId(self.pipes.insert(PipeTask {
            source,
            dest,
            reader,
            writer,
            options,
            state: PipeState::Running,
            pumping: false,
        }));
        debug!(pipe = %id, %source, %dest, "started pipe");
        self.pump_pipe(host, id);
        Ok(id)
    }

    /// Pipe `source` into the writable half of `transform` and hand back its
    /// readable half.
    pub fn pipe_through(
        &mut self,
        host: &mut dyn Host,
        source: ReadableId,
        transform: TransformStream,
        options: PipeOptions,
    ) -> Result<ReadableId> {
        self.pipe_to(host, source, transform.writable, options)?;
        Ok(transform.readable)
    }

    pub fn pipe_state(&self, id: PipeId) -> Option<PipeState> {
        Some(self.pipes.get(id.0)?.state.clone())
    }

    /// Drive every running pipe until none can make progress. Returns the
    /// number of steps taken.
    pub fn pump(&mut self, host: &mut dyn Host) -> usize {
        let mut total = 0;
        loop {
            let running: Vec<PipeId> = self
                .pipes
                .iter()
                .filter(|(_, task)| task.is_running())
                .map(|(key, _)| PipeId(key))
                .collect();
            let mut progress = 0;
            for pipe in running {
                progress += self.pump_pipe(host, pipe);
            }
            if progress == 0 {
                return total;
            }
            total += progress;
        }
    }

    /// Abort whatever `source` is piped into and cancel `source`, for when
    /// the request that produced it is aborted.
    pub fn abort_correlated(
        &mut self,
        host: &mut dyn Host,
        source: ReadableId,
        reason: Option<&str>,
    ) -> Result<()> {
        let pipe = self
            .pipes
            .iter()
            .find(|(_, task)| task.is_running() && task.source == source)
            .map(|(key, task)| (PipeId(key), task.dest, task.reader, task.writer));

        match pipe {
            Some((pipe, dest, reader, writer)) => {
                let _ = self.abort_with(host, dest, writer, reason);
                let _ = self.cancel_with(host, source, reader, reason);
                self.finish_pipe(pipe, PipeState::Failed(StreamError::Aborted));
                Ok(())
            }
            None => {
                if let Some(dest) = self.piped_to(source) {
                    self.abort_inner(host, dest, reason)?;
                }
                if !self.is_locked(source) {
                    self.cancel_inner(host, source, reason)?;
                }
                Ok(())
            }
        }
    }

    // === Lifecycle ===

    /// Remove released, unlocked streams, finished pipes, and bridges whose
    /// halves are both gone. Returns how many entries were removed.
    pub fn sweep(&mut self) -> usize {
        let pipes = self.pipes.retain(|_, task| task.is_running());
        let sources = self
            .sources
            .retain(|_, source| !(source.released && source.reader_lock.is_none()));
        let sinks = self
            .sinks
            .retain(|_, sink| !(sink.released && sink.writer_lock.is_none()));
        let live_sources = &self.sources;
        let live_sinks = &self.sinks;
        let bridges = self.bridges.retain(|_, bridge| {
            live_sources.contains(bridge.readable.0) || live_sinks.contains(bridge.writable.0)
        });
        let removed = pipes + sources + sinks + bridges;
        if removed > 0 {
            debug!(pipes, sources, sinks, bridges, "swept stream registry");
        }
        removed
    }

    /// Drop every entry, released or not.
    pub fn clear(&mut self) {
        self.pipes.clear();
        self.bridges.clear();
        self.sources.clear();
        self.sinks.clear();
    }

    // === Internals ===

    pub(crate) fn source_mut(&mut self, id: ReadableId) -> Result<&mut NativeSource> {
        self.sources.get_mut(id.0).ok_or(StreamError::Released)
    }

    pub(crate) fn sink_mut(&mut self, id: WritableId) -> Result<&mut NativeSink> {
        self.sinks.get_mut(id.0).ok_or(StreamError::Released)
    }

    pub(crate) fn bridge_mut(&mut self, id: BridgeId) -> Result<&mut TransformBridge> {
        self.bridges.get_mut(id.0).ok_or(StreamError::Released)
    }

    /// The running pipe writing into `dest`, if any.
    pub(crate) fn pipe_into(&self, dest: WritableId) -> Option<PipeId> {
        self.pipes
            .iter()
            .find(|(_, task)| task.is_running() && task.dest == dest)
            .map(|(key, _)| PipeId(key))
    }

    fn check_reader(&self, id: ReadableId, token: Option<ReaderToken>) -> Result<()> {
        let source = self.sources.get(id.0).ok_or(StreamError::Released)?;
        match (source.reader_lock, token) {
            (None, None) => Ok(()),
            (Some(_), None) => Err(StreamError::Locked),
            (Some(held), Some(token)) if held == token => Ok(()),
            (_, Some(_)) => Err(StreamError::NotLockHolder),
        }
    }

    fn check_writer(&self, id: WritableId, token: Option<WriterToken>) -> Result<()> {
        let sink = self.sinks.get(id.0).ok_or(StreamError::Released)?;
        match (sink.writer_lock, token) {
            (None, None) => Ok(()),
            (Some(_), None) => Err(StreamError::Locked),
            (Some(held), Some(token)) if held == token => Ok(()),
            (_, Some(_)) => Err(StreamError::NotLockHolder),
        }
    }

    fn read_inner(&mut self, host: &mut dyn Host, id: ReadableId) -> Result<ReadResult> {
        let source = self.source_mut(id)?;
        match source.start_signal.state() {
            SignalState::Pending => return Ok(ReadResult::Pending),
            SignalState::Rejected(error) => return Err(error),
            SignalState::Resolved => {}
        }
        source.disturbed = true;

        if let Some(result) = take_ready(source) {
            if matches!(result, Ok(ReadResult::Chunk(_))) {
                self.call_pull_if_needed(host, id, false);
            }
            return result;
        }

        self.call_pull_if_needed(host, id, true);
        take_ready(self.source_mut(id)?).unwrap_or(Ok(ReadResult::Pending))
    }

    /// Pull if the queue is below the high water mark, or unconditionally
    /// when `force` is set because a reader is waiting on an empty queue.
    /// A pull already in progress is re-run once it returns.
    fn call_pull_if_needed(&mut self, host: &mut dyn Host, id: ReadableId, force: bool) {
        let Ok(source) = self.source_mut(id) else {
            return;
        };
        if !source.start_signal.is_resolved()
            || source.canceled
            || source.controller.is_close_requested()
            || *source.controller.state() != ReadableState::Readable
        {
            return;
        }
        if !force && source.controller.desired_size().unwrap_or(0) <= 0 {
            return;
        }
        if source.pulling {
            source.pull_again = true;
            return;
        }
        source.pulling = true;

        let pull = source.algorithms.pull;
        let result = pull(self, host, id);

        let Ok(source) = self.source_mut(id) else {
            return;
        };
        source.pulling = false;
        match result {
            Err(error) => {
                log_stream_error(&id, &error, "pull");
                source.controller.error(error);
            }
            Ok(()) if source.pull_again => {
                source.pull_again = false;
                self.call_pull_if_needed(host, id, false);
            }
            Ok(()) => {}
        }
    }

    fn cancel_inner(
        &mut self,
        host: &mut dyn Host,
        id: ReadableId,
        reason: Option<&str>,
    ) -> Result<()> {
        let source = self.source_mut(id)?;
        source.disturbed = true;
        match source.controller.state().clone() {
            ReadableState::Closed => return Ok(()),
            ReadableState::Errored(error) => return Err(error),
            ReadableState::Readable => {}
        }
        if source.canceled {
            return Ok(());
        }
        source.canceled = true;
        source.controller.cancel();
        debug!(stream = %id, reason = reason.unwrap_or(""), "canceling readable");

        let cancel = source.algorithms.cancel;
        cancel(self, host, id, reason)
    }

    fn write_inner(&mut self, host: &mut dyn Host, id: WritableId, chunk: Bytes) -> Result<()> {
        let sink = self.sink_mut(id)?;
        match sink.controller.state() {
            WritableState::Writable => {}
            WritableState::Closing | WritableState::Closed => return Err(StreamError::Closed),
            WritableState::Errored(error) => return Err(error.clone()),
        }
        if let SignalState::Rejected(error) = sink.start_signal.state() {
            return Err(error);
        }
        sink.controller.push(chunk);
        self.advance(host, id)
    }

    fn close_inner(&mut self, host: &mut dyn Host, id: WritableId) -> Result<()> {
        let sink = self.sink_mut(id)?;
        match sink.controller.state().clone() {
            WritableState::Closing | WritableState::Closed => return Ok(()),
            WritableState::Errored(StreamError::Aborted) => return Ok(()),
            WritableState::Errored(error) => return Err(error),
            WritableState::Writable => {}
        }
        sink.controller.set_state(WritableState::Closing);
        self.advance(host, id)
    }

    fn abort_inner(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        reason: Option<&str>,
    ) -> Result<()> {
        let sink = self.sink_mut(id)?;
        if sink.controller.state().is_terminal() {
            return Ok(());
        }
        sink.controller.error(StreamError::Aborted);
        if sink.controller.in_flight {
            sink.controller.abort_requested = true;
            return Ok(());
        }
        debug!(stream = %id, reason = reason.unwrap_or(""), "aborting writable");
        let abort = sink.algorithms.abort;
        abort(self, host, id, reason)
    }

    /// Hand queued writes, then a pending close, to the sink one at a time.
    fn advance(&mut self, host: &mut dyn Host, id: WritableId) -> Result<()> {
        loop {
            let sink = self.sink_mut(id)?;
            if sink.controller.in_flight || !sink.start_signal.is_resolved() {
                return Ok(());
            }
            let closing = match sink.controller.state() {
                WritableState::Errored(error) => return Err(error.clone()),
                WritableState::Closed => return Ok(()),
                WritableState::Writable => false,
                WritableState::Closing => true,
            };

            if let Some(chunk) = sink.controller.pop() {
                sink.controller.in_flight = true;
                let write = sink.algorithms.write;
                let result = write(self, host, id, chunk);
                self.settle(host, id, result, "write")?;
                continue;
            }

            if closing {
                sink.controller.in_flight = true;
                let close = sink.algorithms.close;
                let result = close(self, host, id);
                self.settle(host, id, result, "close")?;
                let sink = self.sink_mut(id)?;
                if *sink.controller.state() == WritableState::Closing {
                    sink.controller.set_state(WritableState::Closed);
                    debug!(stream = %id, "writable closed");
                }
            }
            return Ok(());
        }
    }

    /// Clear the in-flight slot after a sink call returns, run an abort that
    /// arrived meanwhile, and record a failure.
    fn settle(
        &mut self,
        host: &mut dyn Host,
        id: WritableId,
        result: Result<()>,
        what: &str,
    ) -> Result<()> {
        let sink = self.sink_mut(id)?;
        sink.controller.in_flight = false;
        if sink.controller.abort_requested {
            sink.controller.abort_requested = false;
            let abort = sink.algorithms.abort;
            if let Err(error) = abort(self, host, id, None) {
                log_stream_error(&id, &error, "deferred abort");
            }
            return Err(StreamError::Aborted);
        }
        if let Err(error) = result {
            log_stream_error(&id, &error, what);
            sink.controller.error(error.clone());
            return Err(error);
        }
        Ok(())
    }

    fn sink_ready(&self, dest: WritableId) -> bool {
        let Some(sink) = self.sinks.get(dest.0) else {
            return true;
        };
        if sink.controller.in_flight || sink.controller.pending_len() > 0 {
            return false;
        }
        match sink.state {
            SinkState::Transform { bridge } => !self.backpressure(bridge),
            _ => true,
        }
    }

    /// Run one pipe until it finishes or has to wait. Returns the number of
    /// steps taken.
    pub(crate) fn pump_pipe(&mut self, host: &mut dyn Host, pipe: PipeId) -> usize {
        match self.pipes.get_mut(pipe.0) {
            Some(task) if task.is_running() && !task.pumping => task.pumping = true,
            _ => return 0,
        }
        let steps = self.pump_pipe_steps(host, pipe);
        if let Some(task) = self.pipes.get_mut(pipe.0) {
            task.pumping = false;
        }
        steps
    }

    fn pump_pipe_steps(&mut self, host: &mut dyn Host, pipe: PipeId) -> usize {
        let Some(task) = self.pipes.get(pipe.0) else {
            return 0;
        };
        let (source, dest, reader, writer, options) =
            (task.source, task.dest, task.reader, task.writer, task.options);
        let mut steps = 0;

        loop {
            match self.writable_state(dest) {
                None => {
                    self.finish_pipe(pipe, PipeState::Failed(StreamError::Released));
                    return steps + 1;
                }
                Some(WritableState::Errored(error)) => {
                    if !options.prevent_cancel {
                        let _ = self.cancel_with(host, source, reader, None);
                    }
                    self.finish_pipe(pipe, PipeState::Failed(error));
                    return steps + 1;
                }
                Some(WritableState::Closing | WritableState::Closed) => {
                    if !options.prevent_cancel {
                        let _ = self.cancel_with(host, source, reader, None);
                    }
                    self.finish_pipe(pipe, PipeState::Failed(StreamError::Closed));
                    return steps + 1;
                }
                Some(WritableState::Writable) => {}
            }
            if !self.sink_ready(dest) {
                return steps;
            }

            match self.read_with(host, source, reader) {
                Ok(ReadResult::Chunk(chunk)) => {
                    steps += 1;
                    if let Err(error) = self.write_with(host, dest, writer, chunk) {
                        if !options.prevent_cancel {
                            let _ = self.cancel_with(host, source, reader, None);
                        }
                        self.finish_pipe(pipe, PipeState::Failed(error));
                        return steps;
                    }
                }
                Ok(ReadResult::Done) => {
                    let outcome = if options.prevent_close {
                        Ok(())
                    } else {
                        self.close_with(host, dest, writer)
                    };
                    let state = match outcome {
                        Ok(()) => PipeState::Done,
                        Err(error) => PipeState::Failed(error),
                    };
                    self.finish_pipe(pipe, state);
                    return steps + 1;
                }
                Ok(ReadResult::Pending) => return steps,
                Err(error) => {
                    if !options.prevent_abort {
                        let _ = self.abort_with(host, dest, writer, None);
                    }
                    self.finish_pipe(pipe, PipeState::Failed(error));
                    return steps + 1;
                }
            }
        }
    }

    fn finish_pipe(&mut self, pipe: PipeId, state: PipeState) {
        let Some(task) = self.pipes.get_mut(pipe.0) else {
            return;
        };
        if !task.is_running() {
            return;
        }
        task.state = state;
        task.log_finish(pipe);
        let (source, dest, reader, writer) = (task.source, task.dest, task.reader, task.writer);

        let _ = self.release_reader(source, reader);
        let _ = self.release_writer(dest, writer);
        if let Ok(entry) = self.source_mut(source) {
            entry.piped_to = None;
        }
    }
}

fn take_ready(source: &mut NativeSource) -> Option<Result<ReadResult>> {
    match source.controller.state().clone() {
        ReadableState::Errored(error) => Some(Err(error)),
        ReadableState::Closed => Some(Ok(ReadResult::Done)),
        ReadableState::Readable => source
            .controller
            .dequeue()
            .map(|chunk| Ok(ReadResult::Chunk(chunk))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgebridge_host::{HostError, HostOp, InMemoryHost};

    #[test]
    fn body_source_reads_chunks_then_done() {
        let mut host = InMemoryHost::new().with_chunk_size(4);
        let body = host.add_body("abcdefgh");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        assert!(streams.is_body(id));
        assert!(streams.has_native_source(id));
        assert!(!streams.is_disturbed(id));

        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Chunk("abcd".into()));
        assert!(streams.is_disturbed(id));
        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Chunk("efgh".into()));
        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Done);
        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Done);
        assert_eq!(host.call_count(HostOp::BodyRead), 3);
    }

    #[test]
    fn reader_lock_is_exclusive() {
        let mut host = InMemoryHost::new();
        let body = host.add_body("x");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        let token = streams.get_reader(id).unwrap();
        assert!(streams.is_locked(id));
        assert_eq!(streams.get_reader(id), Err(StreamError::Locked));
        assert_eq!(streams.read(&mut host, id), Err(StreamError::Locked));

        streams.release_reader(id, token).unwrap();
        assert!(!streams.is_locked(id));
        let again = streams.get_reader(id).unwrap();
        assert_eq!(streams.release_reader(id, token), Err(StreamError::NotLockHolder));
        streams.release_reader(id, again).unwrap();
    }

    #[test]
    fn guard_releases_lock_on_drop() {
        let mut host = InMemoryHost::new();
        host.fail_next(HostOp::BodyRead, HostError::BadHandle);
        let body = host.add_body("x");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        {
            let mut guard = streams.acquire_reader(id).unwrap();
            assert!(guard.read(&mut host).is_err());
        }
        assert!(!streams.is_locked(id));
    }

    #[test]
    fn host_error_during_pull_errors_stream() {
        let mut host = InMemoryHost::new();
        host.fail_next(HostOp::BodyRead, HostError::BadHandle);
        let body = host.add_body("x");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        let expected = StreamError::host(HostOp::BodyRead, HostError::BadHandle);
        assert_eq!(streams.read(&mut host, id), Err(expected.clone()));
        assert_eq!(streams.readable_state(id), Some(ReadableState::Errored(expected.clone())));
        assert_eq!(streams.read(&mut host, id), Err(expected));
        assert_eq!(host.call_count(HostOp::BodyRead), 1);
    }

    #[test]
    fn cancel_abandons_body_once() {
        let mut host = InMemoryHost::new();
        let body = host.add_body("unread");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        streams.cancel(&mut host, id, Some("not needed")).unwrap();
        streams.cancel(&mut host, id, None).unwrap();
        assert!(host.body_is_abandoned(body));
        assert_eq!(host.call_count(HostOp::BodyAbandon), 1);
        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Done);
    }

    #[test]
    fn body_sink_writes_and_closes() {
        let mut host = InMemoryHost::new();
        let body = host.body_new().unwrap();
        let mut streams = Streams::default();
        let id = streams.body_sink(body);

        streams.write(&mut host, id, Bytes::from_static(b"hello ")).unwrap();
        streams.write(&mut host, id, Bytes::from_static(b"world")).unwrap();
        streams.close(&mut host, id).unwrap();

        assert_eq!(host.body_contents(body), Some(Bytes::from_static(b"hello world")));
        assert!(host.body_is_closed(body));
        assert_eq!(streams.writable_state(id), Some(WritableState::Closed));
        assert_eq!(
            streams.write(&mut host, id, Bytes::from_static(b"late")),
            Err(StreamError::Closed)
        );
    }

    #[test]
    fn close_and_abort_are_idempotent() {
        let mut host = InMemoryHost::new();
        let closed = host.body_new().unwrap();
        let aborted = host.body_new().unwrap();
        let mut streams = Streams::default();
        let a = streams.body_sink(closed);
        let b = streams.body_sink(aborted);

        streams.close(&mut host, a).unwrap();
        streams.close(&mut host, a).unwrap();
        assert_eq!(host.call_count(HostOp::BodyClose), 1);

        streams.abort(&mut host, b, None).unwrap();
        streams.abort(&mut host, b, None).unwrap();
        streams.close(&mut host, b).unwrap();
        assert_eq!(host.call_count(HostOp::BodyAbandon), 1);
        assert_eq!(host.call_count(HostOp::BodyClose), 1);
    }

    #[test]
    fn failed_write_errors_sink() {
        let mut host = InMemoryHost::new();
        host.fail_next(HostOp::BodyWrite, HostError::Generic);
        let body = host.body_new().unwrap();
        let mut streams = Streams::default();
        let id = streams.body_sink(body);

        let expected = StreamError::host(HostOp::BodyWrite, HostError::Generic);
        assert_eq!(
            streams.write(&mut host, id, Bytes::from_static(b"x")),
            Err(expected.clone())
        );
        assert_eq!(streams.writable_state(id), Some(WritableState::Errored(expected.clone())));
        assert_eq!(streams.close(&mut host, id), Err(expected));
    }

    #[test]
    fn sweep_drops_released_unlocked_entries() {
        let mut host = InMemoryHost::new();
        let body = host.add_body("x");
        let mut streams = Streams::default();
        let kept = streams.body_source(body);
        let dropped = streams.body_source(body);
        let locked = streams.body_source(body);
        let token = streams.get_reader(locked).unwrap();

        streams.release_readable(dropped);
        streams.release_readable(locked);
        assert_eq!(streams.sweep(), 1);
        assert!(streams.contains_readable(kept));
        assert!(!streams.contains_readable(dropped));
        assert!(streams.contains_readable(locked));

        streams.release_reader(locked, token).unwrap();
        assert_eq!(streams.sweep(), 1);
        assert_eq!(streams.readable_count(), 1);
    }

    #[test]
    fn owner_is_tracked_until_release() {
        let mut host = InMemoryHost::new();
        let body = host.add_body("x");
        let mut streams = Streams::default();
        let id = streams.body_source(body);

        streams.set_readable_owner(id, OwnerKey(7)).unwrap();
        assert_eq!(streams.readable_owner(id), Some(OwnerKey(7)));
        streams.release_readable(id);
        assert_eq!(streams.readable_owner(id), None);
    }

    #[test]
    fn zero_chunk_size_still_reads_the_body() {
        let mut host = InMemoryHost::new();
        let body = host.add_body("payload");
        let mut streams = Streams::new(StreamConfig {
            body_chunk_size: 0,
            ..StreamConfig::default()
        });
        assert_eq!(streams.config().body_chunk_size, 1);

        let id = streams.body_source(body);
        assert_eq!(streams.read(&mut host, id).unwrap(), ReadResult::Chunk("p".into()));
        let mut rest = Vec::new();
        loop {
            match streams.read(&mut host, id).unwrap() {
                ReadResult::Chunk(chunk) => rest.extend_from_slice(&chunk),
                ReadResult::Done => break,
                ReadResult::Pending => panic!("body source went pending"),
            }
        }
        assert_eq!(rest, b"ayload");
    }
}
