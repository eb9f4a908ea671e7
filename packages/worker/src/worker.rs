//! Request driver.
//!
//! The worker owns the host, the stream registry and configuration for one
//! guest instance. For each request it:
//! - hands the request body to the handler
//! - streams the handler's response body into a fresh host body
//! - frees whatever the request left behind

use edgebridge_body::Body;
use edgebridge_builtins::ScriptError;
use edgebridge_host::{BodyHandle, Host, HostOp};
use edgebridge_streams::{PipeId, PipeOptions, PipeState, ReadableId, Streams, WritableId};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};

/// What a handler gets to work with during one request.
pub struct RequestContext<'a> {
    pub host: &'a mut dyn Host,
    pub streams: &'a mut Streams,
    request: Option<Body>,
}

impl RequestContext<'_> {
    /// The request body, unless the handler already took it.
    pub fn request(&mut self) -> Option<&mut Body> {
        self.request.as_mut()
    }

    /// Take ownership of the request body, for example to echo it back.
    pub fn take_request(&mut self) -> Option<Body> {
        self.request.take()
    }
}

/// Produces a response body for a request.
pub trait Handler {
    fn handle(&mut self, ctx: &mut RequestContext<'_>) -> std::result::Result<Body, ScriptError>;
}

impl<F> Handler for F
where
    F: FnMut(&mut RequestContext<'_>) -> std::result::Result<Body, ScriptError>,
{
    fn handle(&mut self, ctx: &mut RequestContext<'_>) -> std::result::Result<Body, ScriptError> {
        self(ctx)
    }
}

pub struct Worker<H: Host> {
    config: WorkerConfig,
    host: H,
    streams: Streams,
    requests: u64,
}

impl<H: Host> Worker<H> {
    pub fn new(host: H, config: WorkerConfig) -> Self {
        let streams = Streams::new(config.stream_config());
        Self {
            config,
            host,
            streams,
            requests: 0,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn streams(&self) -> &Streams {
        &self.streams
    }

    /// Number of requests handled so far.
    pub fn request_count(&self) -> u64 {
        self.requests
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Run one request and return the host body holding the response.
    ///
    /// The response is closed before this returns. On failure the response
    /// body, if one was created, is abandoned.
    pub fn handle(
        &mut self,
        request: BodyHandle,
        handler: &mut impl Handler,
    ) -> Result<BodyHandle> {
        self.requests += 1;
        let id = self.requests;
        debug!(request = id, body = %request, "handling request");

        let mut ctx = RequestContext {
            host: &mut self.host,
            streams: &mut self.streams,
            request: Some(Body::from_handle(request)),
        };
        let outcome = handler.handle(&mut ctx);
        let leftover = ctx.request.take();
        if let Some(mut body) = leftover {
            body.release(&mut self.streams);
        }

        let result = match outcome {
            Ok(mut response) => {
                let sent = self.send(&mut response);
                response.release(&mut self.streams);
                sent
            }
            Err(error) => Err(WorkerError::Handler(error)),
        };

        if self.config.sweep_after_request {
            self.streams.sweep();
        }
        match &result {
            Ok(response) => info!(request = id, %response, "request complete"),
            Err(error) => warn!(request = id, %error, "request failed"),
        }
        result
    }

    /// Stream `response` through an identity transform into a new host body.
    fn send(&mut self, response: &mut Body) -> Result<BodyHandle> {
        if response.is_used() {
            return Err(WorkerError::Handler(ScriptError::type_error(
                "response body has already been used",
            )));
        }
        let dest = self
            .host
            .body_new()
            .map_err(|error| WorkerError::Host {
                op: HostOp::BodyNew,
                error,
            })?;
        let sink = self.streams.body_sink(dest);
        let result = self.pipe_response(response, sink);
        if result.is_err() {
            let _ = self
                .streams
                .abort(&mut self.host, sink, Some("response failed"));
        }
        self.streams.release_writable(sink);
        result.map(|()| dest)
    }

    fn pipe_response(
        &mut self,
        response: &mut Body,
        sink: WritableId,
    ) -> Result<()> {
        let readable = response.pipe_through_identity(&mut self.streams, &mut self.host)?;
        let pipe = self
            .streams
            .pipe_to(&mut self.host, readable, sink, PipeOptions::default())?;
        self.streams.pump(&mut self.host);
        self.finish(pipe, readable)
    }

    fn finish(&mut self, pipe: PipeId, readable: ReadableId) -> Result<()> {
        match self.streams.pipe_state(pipe) {
            Some(PipeState::Done) => Ok(()),
            Some(PipeState::Failed(error)) => Err(WorkerError::Stream(error)),
            Some(PipeState::Running) | None => {
                let _ = self
                    .streams
                    .abort_correlated(&mut self.host, readable, Some("response stalled"));
                Err(WorkerError::Stalled)
            }
        }
    }
}
