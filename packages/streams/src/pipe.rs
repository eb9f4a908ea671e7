//! Pipes from a readable stream into a writable stream.

use tracing::debug;

use crate::error::StreamError;
use crate::id::{PipeId, ReadableId, ReaderToken, WritableId, WriterToken};

/// How a pipe propagates termination between its ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeOptions {
    /// Leave the destination open when the source finishes.
    pub prevent_close: bool,
    /// Leave the destination un-aborted when the source errors.
    pub prevent_abort: bool,
    /// Leave the source un-canceled when the destination errors.
    pub prevent_cancel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeState {
    Running,
    Done,
    Failed(StreamError),
}

/// A pipe holds the source's reader lock and the destination's writer lock
/// until it finishes.
pub(crate) struct PipeTask {
    pub(crate) source: ReadableId,
    pub(crate) dest: WritableId,
    pub(crate) reader: ReaderToken,
    pub(crate) writer: WriterToken,
    pub(crate) options: PipeOptions,
    pub(crate) state: PipeState,
    /// Set while the pipe is being driven, so a nested pull cannot re-enter it.
    pub(crate) pumping: bool,
}

impl PipeTask {
    pub(crate) fn is_running(&self) -> bool {
        self.state == PipeState::Running
    }

    pub(crate) fn log_finish(&self, id: PipeId) {
        match &self.state {
            PipeState::Running => {}
            PipeState::Done => {
                debug!(pipe = %id, source = %self.source, dest = %self.dest, "pipe finished")
            }
            PipeState::Failed(error) => {
                debug!(pipe = %id, source = %self.source, dest = %self.dest, %error, "pipe failed")
            }
        }
    }
}
