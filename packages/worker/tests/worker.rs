use bytes::Bytes;
use collection_literals::btree;
use edgebridge_body::{Body, BodyError};
use edgebridge_builtins::{Dictionary, ScriptError};
use edgebridge_host::{HostError, HostOp, InMemoryHost};
use edgebridge_streams::{
    PipeOptions, ReadableController, Result as StreamResult, StreamError, TransformController,
    Transformer, UnderlyingSource,
};
use edgebridge_worker::{RequestContext, Worker, WorkerConfig, WorkerError};

struct Upper;

impl Transformer for Upper {
    fn transform(
        &mut self,
        chunk: Bytes,
        controller: &mut TransformController<'_>,
    ) -> StreamResult<()> {
        controller.enqueue(Bytes::from(chunk.to_ascii_uppercase()))
    }
}

/// Fails on the first pull.
struct Broken;

impl UnderlyingSource for Broken {
    fn pull(&mut self, _controller: &mut ReadableController) -> StreamResult<()> {
        Err(StreamError::algorithm("upstream reset"))
    }
}

/// Never produces anything.
struct Silent;

impl UnderlyingSource for Silent {
    fn pull(&mut self, _controller: &mut ReadableController) -> StreamResult<()> {
        Ok(())
    }
}

fn echo(ctx: &mut RequestContext<'_>) -> Result<Body, ScriptError> {
    Ok(ctx.take_request().expect("request body"))
}

fn shout(ctx: &mut RequestContext<'_>) -> Result<Body, ScriptError> {
    let mut request = ctx.take_request().expect("request body");
    let source = request.stream(ctx.streams)?;
    let transform = ctx.streams.transform(Box::new(Upper));
    let readable = ctx
        .streams
        .pipe_through(ctx.host, source, transform, PipeOptions::default())?;
    request.release(ctx.streams);
    ctx.streams.release_writable(transform.writable);
    Ok(Body::from_stream(ctx.streams, readable)?)
}

#[test]
fn echo_copies_request_into_closed_response() {
    let mut host = InMemoryHost::new().with_chunk_size(3);
    let request = host.add_body("hello, edge");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let response = worker.handle(request, &mut echo).unwrap();

    assert_ne!(response, request);
    assert_eq!(worker.host().body_contents(response).unwrap(), "hello, edge");
    assert!(worker.host().body_is_closed(response));
    assert_eq!(worker.request_count(), 1);
}

#[test]
fn empty_request_gives_empty_closed_response() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let response = worker.handle(request, &mut echo).unwrap();

    assert!(worker.host().body_contents(response).unwrap().is_empty());
    assert!(worker.host().body_is_closed(response));
}

#[test]
fn transformed_response_is_streamed() {
    let mut host = InMemoryHost::new().with_chunk_size(4);
    let request = host.add_body("quiet words");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let response = worker.handle(request, &mut shout).unwrap();

    assert_eq!(worker.host().body_contents(response).unwrap(), "QUIET WORDS");
    assert!(worker.host().body_is_closed(response));
}

#[test]
fn handler_can_use_dictionaries() {
    let mut host = InMemoryHost::new();
    host.add_dictionary("greetings", btree! { "en" => "hello", "fr" => "bonjour" });
    let request = host.add_body("fr");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let mut greet = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        let mut request = ctx.take_request().expect("request body");
        let lang = request.text(ctx.streams, ctx.host)?;
        let greetings = Dictionary::open(ctx.host, "greetings")?;
        let word = greetings
            .get(ctx.host, lang.trim())?
            .unwrap_or_else(|| "hi".to_string());
        Ok(Body::from_text(ctx.host, &word)?)
    };
    let response = worker.handle(request, &mut greet).unwrap();

    assert_eq!(worker.host().body_contents(response).unwrap(), "bonjour");
}

#[test]
fn handler_error_creates_no_response() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("x");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let mut fail = |_: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        Err(ScriptError::error("no route"))
    };
    let err = worker.handle(request, &mut fail).unwrap_err();

    assert!(matches!(err, WorkerError::Handler(ref e) if e.message() == "no route"));
    assert_eq!(worker.host().call_count(HostOp::BodyNew), 0);
    assert_eq!(worker.streams().readable_count(), 0);
}

#[test]
fn used_response_body_is_a_type_error() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("spent");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let mut drained = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        let mut request = ctx.take_request().expect("request body");
        request.bytes(ctx.streams, ctx.host)?;
        Ok(request)
    };
    let err = worker.handle(request, &mut drained).unwrap_err();

    assert!(matches!(err, WorkerError::Handler(ScriptError::TypeError(_))));
    assert_eq!(worker.host().call_count(HostOp::BodyNew), 0);
}

#[test]
fn failing_response_stream_abandons_response() {
    let host = InMemoryHost::new();
    let mut worker = Worker::new(host, WorkerConfig::default());
    let request = worker.host_mut().add_body("");

    let mut broken = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        let stream = ctx.streams.script_source(Box::new(Broken), 0);
        Ok(Body::from_stream(ctx.streams, stream)?)
    };
    let err = worker.handle(request, &mut broken).unwrap_err();

    assert!(matches!(err, WorkerError::Stream(_)));
    assert_eq!(worker.host().call_count(HostOp::BodyAbandon), 1);
    assert_eq!(worker.host().call_count(HostOp::BodyClose), 0);
    assert_eq!(worker.streams().bridge_count(), 0);
    assert_eq!(worker.streams().writable_count(), 0);
}

#[test]
fn stalled_response_is_aborted() {
    let host = InMemoryHost::new();
    let mut worker = Worker::new(host, WorkerConfig::default());
    let request = worker.host_mut().add_body("");

    let mut silent = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        let stream = ctx.streams.script_source(Box::new(Silent), 0);
        Ok(Body::from_stream(ctx.streams, stream)?)
    };
    let err = worker.handle(request, &mut silent).unwrap_err();

    assert!(matches!(err, WorkerError::Stalled));
    assert_eq!(worker.host().call_count(HostOp::BodyAbandon), 1);
}

#[test]
fn host_failure_creating_response_is_reported() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("x");
    host.fail_next(HostOp::BodyNew, HostError::Generic);
    let mut worker = Worker::new(host, WorkerConfig::default());

    let err = worker.handle(request, &mut echo).unwrap_err();

    assert!(matches!(
        err,
        WorkerError::Host {
            op: HostOp::BodyNew,
            error: HostError::Generic
        }
    ));
}

#[test]
fn streams_are_swept_after_each_request() {
    let mut host = InMemoryHost::new();
    let first = host.add_body("one");
    let second = host.add_body("two");
    let mut worker = Worker::new(host, WorkerConfig::default());

    worker.handle(first, &mut shout).unwrap();
    worker.handle(second, &mut echo).unwrap();

    let streams = worker.streams();
    assert_eq!(streams.readable_count(), 0);
    assert_eq!(streams.writable_count(), 0);
    assert_eq!(streams.bridge_count(), 0);
    assert_eq!(streams.pipe_count(), 0);
    assert_eq!(worker.request_count(), 2);
}

#[test]
fn sweep_can_be_turned_off() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("kept");
    let config = WorkerConfig {
        sweep_after_request: false,
        ..WorkerConfig::default()
    };
    let mut worker = Worker::new(host, config);

    worker.handle(request, &mut echo).unwrap();

    assert!(worker.streams().readable_count() > 0);
}

#[test]
fn config_from_file_drives_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker.json");
    std::fs::write(&path, r#"{"body_chunk_size": 2}"#).unwrap();
    let config = WorkerConfig::from_file(&path).unwrap();

    let mut host = InMemoryHost::new();
    let request = host.add_body("abcde");
    let mut worker = Worker::new(host, config);
    let response = worker.handle(request, &mut echo).unwrap();

    assert_eq!(worker.host().body_contents(response).unwrap(), "abcde");
    assert_eq!(worker.host().call_count(HostOp::BodyRead), 4);
}

#[test]
fn locked_response_body_abandons_response() {
    let mut host = InMemoryHost::new();
    let request = host.add_body("held");
    let mut worker = Worker::new(host, WorkerConfig::default());

    let mut locked = |ctx: &mut RequestContext<'_>| -> Result<Body, ScriptError> {
        let mut request = ctx.take_request().expect("request body");
        let stream = request.stream(ctx.streams)?;
        ctx.streams.get_reader(stream)?;
        Ok(request)
    };
    let err = worker.handle(request, &mut locked).unwrap_err();

    assert!(matches!(
        err,
        WorkerError::Body(BodyError::Stream(StreamError::Locked))
    ));
    assert_eq!(worker.host().call_count(HostOp::BodyNew), 1);
    assert_eq!(worker.host().call_count(HostOp::BodyAbandon), 1);
    assert_eq!(worker.host().call_count(HostOp::BodyClose), 0);
    assert_eq!(worker.streams().bridge_count(), 0);
    assert_eq!(worker.streams().writable_count(), 0);
}
