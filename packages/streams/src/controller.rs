//! Stream controllers: the queue and state each adapter drives.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{Result, StreamError};

/// Lifecycle of the readable side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadableState {
    Readable,
    Closed,
    Errored(StreamError),
}

/// The controller handed to source algorithms.
///
/// Sources push bytes with [`enqueue`](Self::enqueue), signal end of stream
/// with [`close`](Self::close), or fail the stream with
/// [`error`](Self::error). The queue is measured in bytes; the high water
/// mark sets how much unconsumed data a source may buffer before
/// [`desired_size`](Self::desired_size) drops to zero and pulls stop.
#[derive(Debug)]
pub struct ReadableController {
    queue: VecDeque<Bytes>,
    queued_bytes: usize,
    high_water_mark: usize,
    close_requested: bool,
    state: ReadableState,
}

impl ReadableController {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
            high_water_mark,
            close_requested: false,
            state: ReadableState::Readable,
        }
    }

    /// Queue a chunk for the consumer. Empty chunks are dropped.
    pub fn enqueue(&mut self, chunk: Bytes) -> Result<()> {
        match &self.state {
            ReadableState::Errored(e) => return Err(e.clone()),
            ReadableState::Closed => return Err(StreamError::Closed),
            ReadableState::Readable if self.close_requested => return Err(StreamError::Closed),
            ReadableState::Readable => {}
        }
        if chunk.is_empty() {
            return Ok(());
        }
        self.queued_bytes += chunk.len();
        self.queue.push_back(chunk);
        Ok(())
    }

    /// Signal end of stream. Chunks already queued are still delivered.
    pub fn close(&mut self) -> Result<()> {
        match &self.state {
            ReadableState::Errored(e) => return Err(e.clone()),
            ReadableState::Closed => return Err(StreamError::Closed),
            ReadableState::Readable if self.close_requested => return Err(StreamError::Closed),
            ReadableState::Readable => {}
        }
        self.close_requested = true;
        if self.queue.is_empty() {
            self.state = ReadableState::Closed;
        }
        Ok(())
    }

    /// Fail the stream. Queued chunks are discarded.
    pub fn error(&mut self, error: StreamError) {
        if self.state == ReadableState::Readable {
            self.clear();
            self.state = ReadableState::Errored(error);
        }
    }

    /// Bytes the source may still buffer. `None` once errored, `0` once
    /// closed.
    pub fn desired_size(&self) -> Option<isize> {
        match self.state {
            ReadableState::Errored(_) => None,
            ReadableState::Closed => Some(0),
            ReadableState::Readable => {
                Some(self.high_water_mark as isize - self.queued_bytes as isize)
            }
        }
    }

    pub fn state(&self) -> &ReadableState {
        &self.state
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub(crate) fn dequeue(&mut self) -> Option<Bytes> {
        let chunk = self.queue.pop_front()?;
        self.queued_bytes -= chunk.len();
        if self.close_requested && self.queue.is_empty() {
            self.state = ReadableState::Closed;
        }
        Some(chunk)
    }

    /// Consumer-side cancel: drop everything and close.
    pub(crate) fn cancel(&mut self) {
        self.clear();
        if self.state == ReadableState::Readable {
            self.state = ReadableState::Closed;
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        self.queued_bytes = 0;
    }
}

/// Lifecycle of the writable side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritableState {
    Writable,
    /// `close` was requested; queued writes drain first.
    Closing,
    Closed,
    Errored(StreamError),
}

impl WritableState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WritableState::Closed | WritableState::Errored(_))
    }
}

/// Queue of pending writes plus the single in-flight slot.
#[derive(Debug)]
pub struct WritableController {
    pending: VecDeque<Bytes>,
    pending_bytes: usize,
    high_water_mark: usize,
    pub(crate) in_flight: bool,
    pub(crate) abort_requested: bool,
    state: WritableState,
}

impl WritableController {
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            pending_bytes: 0,
            high_water_mark,
            in_flight: false,
            abort_requested: false,
            state: WritableState::Writable,
        }
    }

    pub fn state(&self) -> &WritableState {
        &self.state
    }

    pub fn desired_size(&self) -> Option<isize> {
        match self.state {
            WritableState::Errored(_) => None,
            WritableState::Closed | WritableState::Closing => Some(0),
            WritableState::Writable => {
                Some(self.high_water_mark as isize - self.pending_bytes as isize)
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn push(&mut self, chunk: Bytes) {
        self.pending_bytes += chunk.len();
        self.pending.push_back(chunk);
    }

    pub(crate) fn pop(&mut self) -> Option<Bytes> {
        let chunk = self.pending.pop_front()?;
        self.pending_bytes -= chunk.len();
        Some(chunk)
    }

    pub(crate) fn set_state(&mut self, state: WritableState) {
        self.state = state;
    }

    /// Fail the stream and drop queued writes. No effect once terminal.
    pub(crate) fn error(&mut self, error: StreamError) {
        if !self.state.is_terminal() {
            self.pending.clear();
            self.pending_bytes = 0;
            self.state = WritableState::Errored(error);
        }
    }
}
