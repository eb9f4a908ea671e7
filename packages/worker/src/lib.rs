//! # edgebridge-worker
//!
//! Drives a guest request handler against a [`Host`](edgebridge_host::Host):
//! the request body goes in as a [`Body`](edgebridge_body::Body), the
//! handler's response body is streamed out into a new host body.
//!
//! ```rust
//! use edgebridge_body::Body;
//! use edgebridge_builtins::ScriptError;
//! use edgebridge_host::InMemoryHost;
//! use edgebridge_worker::{RequestContext, Worker, WorkerConfig};
//!
//! let mut host = InMemoryHost::new();
//! let request = host.add_body("ping");
//! let mut worker = Worker::new(host, WorkerConfig::default());
//!
//! let mut echo = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
//!     Ok(ctx.take_request().expect("request body"))
//! };
//! let response = worker.handle(request, &mut echo).unwrap();
//! assert_eq!(worker.host().body_contents(response).unwrap(), "ping");
//! ```

mod config;
mod error;
mod worker;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use worker::{Handler, RequestContext, Worker};
