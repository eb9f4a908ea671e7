use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use edgebridge_host::{Host, HostError, HostOp, InMemoryHost};
use edgebridge_streams::{
    BridgeState, PipeOptions, PipeState, ReadResult, ReadableController, ReadableState, Result,
    StreamConfig, StreamError, Streams, UnderlyingSink, UnderlyingSource, WritableState,
};

fn drain(
    streams: &mut Streams,
    host: &mut InMemoryHost,
    id: edgebridge_streams::ReadableId,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut guard = streams.acquire_reader(id).unwrap();
    loop {
        match guard.read(host).unwrap() {
            ReadResult::Chunk(chunk) => out.extend_from_slice(&chunk),
            ReadResult::Done => return out,
            ReadResult::Pending => panic!("stream stalled"),
        }
    }
}

#[test]
fn pipe_through_identity_preserves_bytes() {
    for body in [&b""[..], b"a", b"0123456789abcdefghij"] {
        let mut host = InMemoryHost::new().with_chunk_size(8);
        let incoming = host.add_body(Bytes::copy_from_slice(body));
        let mut streams = Streams::new(StreamConfig {
            body_chunk_size: 8,
            ..Default::default()
        });

        let source = streams.body_source(incoming);
        let transform = streams.identity_transform();
        let readable = streams
            .pipe_through(&mut host, source, transform, PipeOptions::default())
            .unwrap();

        assert_eq!(drain(&mut streams, &mut host, readable), body);
        assert_eq!(streams.bridge_state(transform.bridge), Some(BridgeState::ReadableClosed));
    }
}

#[test]
fn pipe_into_body_sink_closes_destination() {
    let mut host = InMemoryHost::new().with_chunk_size(3);
    let incoming = host.add_body("abcdefg");
    let outgoing = host.body_new().unwrap();
    let mut streams = Streams::default();

    let source = streams.body_source(incoming);
    let sink = streams.body_sink(outgoing);
    let pipe = streams
        .pipe_to(&mut host, source, sink, PipeOptions::default())
        .unwrap();

    assert_eq!(streams.pipe_state(pipe), Some(PipeState::Done));
    assert_eq!(host.body_contents(outgoing).unwrap(), "abcdefg");
    assert!(host.body_is_closed(outgoing));
    assert!(!streams.is_locked(source));
    assert!(!streams.is_writable_locked(sink));
    assert_eq!(streams.piped_to(source), None);
}

#[test]
fn finished_pipe_releases_both_ends() {
    let mut host = InMemoryHost::new();
    let incoming = host.add_body("data");
    let mut streams = Streams::default();

    let source = streams.body_source(incoming);
    let transform = streams.identity_transform();
    let readable = streams
        .pipe_through(&mut host, source, transform, PipeOptions::default())
        .unwrap();

    // The whole body fits under the transform's high water mark, so the pipe
    // has already finished.
    assert!(!streams.is_locked(source));
    assert_eq!(streams.get_reader(source).map(|_| ()), Ok(()));
    assert!(streams
        .pipe_to(&mut host, source, transform.writable, PipeOptions::default())
        .is_err());
    assert_eq!(drain(&mut streams, &mut host, readable), b"data");
}

#[test]
fn backpressure_pauses_pipe_until_read() {
    let mut host = InMemoryHost::new().with_chunk_size(4);
    let incoming = host.add_body("aaaabbbbccccdddd");
    let mut streams = Streams::new(StreamConfig {
        body_chunk_size: 4,
        transform_high_water_mark: 4,
        ..Default::default()
    });

    let source = streams.body_source(incoming);
    let transform = streams.identity_transform();
    let readable = streams
        .pipe_through(&mut host, source, transform, PipeOptions::default())
        .unwrap();

    assert_eq!(host.call_count(HostOp::BodyRead), 1);
    assert!(streams.is_locked(source));
    assert_eq!(streams.piped_to(source), Some(transform.writable));
    assert!(streams.backpressure(transform.bridge));

    assert_eq!(drain(&mut streams, &mut host, readable), b"aaaabbbbccccdddd");
    assert!(!streams.is_locked(source));
}

#[test]
fn source_error_aborts_destination() {
    let mut host = InMemoryHost::new();
    host.fail_next(HostOp::BodyRead, HostError::BadHandle);
    let incoming = host.add_body("never read");
    let outgoing = host.body_new().unwrap();
    let mut streams = Streams::default();

    let source = streams.body_source(incoming);
    let sink = streams.body_sink(outgoing);
    let pipe = streams
        .pipe_to(&mut host, source, sink, PipeOptions::default())
        .unwrap();

    let expected = StreamError::host(HostOp::BodyRead, HostError::BadHandle);
    assert_eq!(streams.pipe_state(pipe), Some(PipeState::Failed(expected)));
    assert_eq!(streams.writable_state(sink), Some(WritableState::Errored(StreamError::Aborted)));
    assert!(host.body_is_abandoned(outgoing));
}

#[test]
fn destination_error_cancels_source() {
    let mut host = InMemoryHost::new();
    host.fail_next(HostOp::BodyWrite, HostError::BadHandle);
    let incoming = host.add_body("payload");
    let outgoing = host.body_new().unwrap();
    let mut streams = Streams::default();

    let source = streams.body_source(incoming);
    let sink = streams.body_sink(outgoing);
    let pipe = streams
        .pipe_to(&mut host, source, sink, PipeOptions::default())
        .unwrap();

    assert!(matches!(streams.pipe_state(pipe), Some(PipeState::Failed(_))));
    assert!(host.body_is_abandoned(incoming));
    assert_eq!(streams.readable_state(source), Some(ReadableState::Closed));
}

#[test]
fn prevent_close_leaves_destination_open() {
    let mut host = InMemoryHost::new();
    let incoming = host.add_body("x");
    let outgoing = host.body_new().unwrap();
    let mut streams = Streams::default();

    let source = streams.body_source(incoming);
    let sink = streams.body_sink(outgoing);
    let options = PipeOptions {
        prevent_close: true,
        ..Default::default()
    };
    streams.pipe_to(&mut host, source, sink, options).unwrap();

    assert!(!host.body_is_closed(outgoing));
    assert_eq!(streams.writable_state(sink), Some(WritableState::Writable));
    streams.write(&mut host, sink, Bytes::from_static(b"y")).unwrap();
    assert_eq!(host.body_contents(outgoing).unwrap(), "xy");
}

/// Emits one chunk per pull, then stays pending until `more` is set.
struct Trickle {
    chunks: Vec<&'static str>,
    ready: Rc<RefCell<bool>>,
}

impl UnderlyingSource for Trickle {
    fn pull(&mut self, controller: &mut ReadableController) -> Result<()> {
        if !*self.ready.borrow() {
            return Ok(());
        }
        match self.chunks.pop() {
            Some(chunk) => controller.enqueue(Bytes::from_static(chunk.as_bytes())),
            None => controller.close(),
        }
    }
}

#[test]
fn pump_resumes_pending_pipes() {
    let mut host = InMemoryHost::new();
    let outgoing = host.body_new().unwrap();
    let ready = Rc::new(RefCell::new(false));
    let mut streams = Streams::default();

    let source = streams.script_source(
        Box::new(Trickle {
            chunks: vec!["c", "b", "a"],
            ready: ready.clone(),
        }),
        0,
    );
    assert!(!streams.has_native_source(source));
    let sink = streams.body_sink(outgoing);
    let pipe = streams
        .pipe_to(&mut host, source, sink, PipeOptions::default())
        .unwrap();
    assert_eq!(streams.pipe_state(pipe), Some(PipeState::Running));
    assert_eq!(streams.pump(&mut host), 0);

    *ready.borrow_mut() = true;
    assert!(streams.pump(&mut host) > 0);
    assert_eq!(streams.pipe_state(pipe), Some(PipeState::Done));
    assert_eq!(host.body_contents(outgoing).unwrap(), "abc");
}

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<String>>>);

impl UnderlyingSink for Recorder {
    fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.0.borrow_mut().push(String::from_utf8_lossy(&chunk).into_owned());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.0.borrow_mut().push("<close>".into());
        Ok(())
    }

    fn abort(&mut self, _reason: Option<&str>) -> Result<()> {
        self.0.borrow_mut().push("<abort>".into());
        Ok(())
    }
}

#[test]
fn script_sink_sees_writes_in_order_then_close() {
    let mut host = InMemoryHost::new();
    let recorder = Recorder::default();
    let mut streams = Streams::default();
    let sink = streams.script_sink(Box::new(recorder.clone()));

    let writer = streams.get_writer(sink).unwrap();
    assert_eq!(
        streams.write(&mut host, sink, Bytes::from_static(b"no")),
        Err(StreamError::Locked)
    );
    for chunk in ["one", "two", "three"] {
        streams
            .write_with(&mut host, sink, writer, Bytes::from_static(chunk.as_bytes()))
            .unwrap();
    }
    streams.close_with(&mut host, sink, writer).unwrap();
    streams.abort_with(&mut host, sink, writer, None).unwrap();

    assert_eq!(*recorder.0.borrow(), ["one", "two", "three", "<close>"]);
    assert_eq!(host.total_calls(), 0);
}

#[test]
fn abort_correlated_tears_down_pipe() {
    let mut host = InMemoryHost::new();
    let outgoing = host.body_new().unwrap();
    let ready = Rc::new(RefCell::new(false));
    let mut streams = Streams::default();

    let source = streams.script_source(
        Box::new(Trickle {
            chunks: vec!["a"],
            ready,
        }),
        0,
    );
    let sink = streams.body_sink(outgoing);
    let pipe = streams
        .pipe_to(&mut host, source, sink, PipeOptions::default())
        .unwrap();

    streams.abort_correlated(&mut host, source, Some("client went away")).unwrap();
    assert_eq!(streams.pipe_state(pipe), Some(PipeState::Failed(StreamError::Aborted)));
    assert!(host.body_is_abandoned(outgoing));
    assert!(!streams.is_locked(source));
    assert_eq!(streams.readable_state(source), Some(ReadableState::Closed));

    streams.release_readable(source);
    streams.release_writable(sink);
    assert_eq!(streams.sweep(), 3);
    assert_eq!(streams.pipe_count(), 0);
}
