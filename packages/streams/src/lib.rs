//! Native stream adapters for edgebridge.
//!
//! This crate turns host bodies into readable and writable streams and back.
//! Everything lives in a [`Streams`] registry: sources, sinks, transform
//! bridges and pipes are arena entries addressed by small copyable ids, and
//! cross references between them are weak.
//!
//! ```
//! use edgebridge_host::{Host, InMemoryHost};
//! use edgebridge_streams::{PipeOptions, PipeState, ReadResult, Streams};
//!
//! let mut host = InMemoryHost::new();
//! let incoming = host.add_body("hello");
//! let outgoing = host.body_new().unwrap();
//!
//! let mut streams = Streams::default();
//! let source = streams.body_source(incoming);
//! let sink = streams.body_sink(outgoing);
//! let pipe = streams.pipe_to(&mut host, source, sink, PipeOptions::default()).unwrap();
//!
//! assert_eq!(streams.pipe_state(pipe), Some(PipeState::Done));
//! assert_eq!(host.body_contents(outgoing).unwrap(), "hello");
//! assert!(host.body_is_closed(outgoing));
//! ```

mod arena;
mod config;
mod controller;
mod error;
mod id;
mod lock;
mod pipe;
mod signal;
mod sink;
mod source;
mod streams;
mod transform;

pub use config::StreamConfig;
pub use controller::{ReadableController, ReadableState, WritableController, WritableState};
pub use error::{Result, StreamError};
pub use id::{BridgeId, OwnerKey, PipeId, ReadableId, ReaderToken, WritableId, WriterToken};
pub use lock::ReaderGuard;
pub use pipe::{PipeOptions, PipeState};
pub use signal::{SignalState, StartSignal};
pub use sink::{SinkKind, UnderlyingSink};
pub use source::{SourceKind, UnderlyingSource};
pub use streams::{ReadResult, Streams};
pub use transform::{
    BridgeState, IdentityTransformer, TransformController, TransformStream, Transformer,
};
