//! Scoped reader locks.

use edgebridge_host::Host;

use crate::error::Result;
use crate::id::{ReadableId, ReaderToken};
use crate::streams::{ReadResult, Streams};

/// Holds a readable stream's reader lock for as long as it lives.
///
/// The lock is released when the guard drops, on every exit path, so a
/// failed read never leaves the stream locked.
pub struct ReaderGuard<'a> {
    streams: &'a mut Streams,
    id: ReadableId,
    token: ReaderToken,
}

impl<'a> ReaderGuard<'a> {
    pub(crate) fn new(streams: &'a mut Streams, id: ReadableId, token: ReaderToken) -> Self {
        Self { streams, id, token }
    }

    pub fn id(&self) -> ReadableId {
        self.id
    }

    pub fn token(&self) -> ReaderToken {
        self.token
    }

    pub fn read(&mut self, host: &mut dyn Host) -> Result<ReadResult> {
        self.streams.read_with(host, self.id, self.token)
    }

    pub fn cancel(&mut self, host: &mut dyn Host, reason: Option<&str>) -> Result<()> {
        self.streams.cancel_with(host, self.id, self.token, reason)
    }

    /// The registry, for driving pipes while the lock is held.
    pub fn streams(&mut self) -> &mut Streams {
        self.streams
    }
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        let _ = self.streams.release_reader(self.id, self.token);
    }
}
