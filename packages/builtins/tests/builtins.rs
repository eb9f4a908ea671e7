use bytes::Bytes;
use collection_literals::btree;
use edgebridge_body::Body;
use edgebridge_host::{HostError, HostOp, InMemoryHost};
use edgebridge_builtins::{ConfigStore, Dictionary, Logger, ObjectStore, ScriptError};
use edgebridge_streams::{ReadableController, Result as StreamResult, Streams, UnderlyingSource};

fn config_host() -> InMemoryHost {
    let mut host = InMemoryHost::new();
    host.add_dictionary("Config 1", btree! { "token" => "s3cr3t", "region" => "eu" });
    host
}

#[test]
fn dictionary_scenario() {
    let mut host = config_host();
    let dict = Dictionary::open(&mut host, "Config 1").unwrap();
    assert_eq!(dict.get(&mut host, "token").unwrap().as_deref(), Some("s3cr3t"));

    let before = host.total_calls();
    assert_eq!(
        dict.get(&mut host, ""),
        Err(ScriptError::type_error("dictionary key cannot be empty"))
    );
    assert_eq!(
        dict.get(&mut host, &"k".repeat(300)),
        Err(ScriptError::type_error(
            "dictionary key cannot be more than 255 bytes, got 300"
        ))
    );
    assert_eq!(host.total_calls(), before);
}

#[test]
fn missing_key_is_none() {
    let mut host = config_host();
    let dict = Dictionary::open(&mut host, "Config 1").unwrap();
    assert_eq!(dict.get(&mut host, "absent").unwrap(), None);
}

#[test]
fn invalid_dictionary_names_never_reach_host() {
    let mut host = config_host();
    let long = "a".repeat(256);
    for name in ["", "1config", "conf-ig", long.as_str()] {
        assert!(matches!(
            Dictionary::open(&mut host, name),
            Err(ScriptError::TypeError(_))
        ));
    }
    assert_eq!(host.total_calls(), 0);
}

#[test]
fn missing_dictionary_is_an_error() {
    let mut host = config_host();
    assert_eq!(
        Dictionary::open(&mut host, "Nope").unwrap_err(),
        ScriptError::error("dictionary 'Nope' does not exist")
    );
}

#[test]
fn bad_handle_surfaces_as_error() {
    let mut host = config_host();
    let dict = Dictionary::open(&mut host, "Config 1").unwrap();
    host.fail_next(HostOp::DictionaryGet, HostError::BadHandle);
    assert_eq!(
        dict.get(&mut host, "token"),
        Err(ScriptError::error("dictionary_get failed: bad handle"))
    );
}

#[test]
fn config_store_reads_like_dictionary() {
    let mut host = config_host();
    let store = ConfigStore::open(&mut host, "Config 1").unwrap();
    assert_eq!(store.name(), "Config 1");
    assert_eq!(store.get(&mut host, "region").unwrap().as_deref(), Some("eu"));
    assert_eq!(
        store.get(&mut host, "").unwrap_err(),
        ScriptError::type_error("config store key cannot be empty")
    );
    assert_eq!(
        ConfigStore::open(&mut host, "Other").unwrap_err(),
        ScriptError::error("config store 'Other' does not exist")
    );
}

#[test]
fn logger_writes_lines() {
    let mut host = InMemoryHost::new();
    let logger = Logger::open(&mut host, "access").unwrap();
    logger.log(&mut host, "GET /").unwrap();
    logger.log(&mut host, String::from("GET /favicon.ico")).unwrap();
    assert_eq!(host.log_lines("access"), ["GET /", "GET /favicon.ico"]);

    assert!(Logger::open(&mut host, "bad\nname").is_err());
    assert_eq!(host.call_count(HostOp::LogEndpointOpen), 1);
}

#[test]
fn object_store_lookup_and_put() {
    let mut host = InMemoryHost::new();
    host.add_object_store("assets", btree! { "greeting" => Bytes::from("hello") });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "assets").unwrap();

    let mut entry = store.lookup(&mut host, "greeting").unwrap().unwrap();
    assert!(!entry.body_used());
    assert_eq!(entry.text(&mut streams, &mut host).unwrap(), "hello");
    assert!(entry.body_used());
    assert!(matches!(
        entry.text(&mut streams, &mut host),
        Err(ScriptError::TypeError(_))
    ));

    assert!(store.lookup(&mut host, "missing").unwrap().is_none());

    store.put(&mut streams, &mut host, "a", "text value").unwrap();
    store
        .put(&mut streams, &mut host, "b", Bytes::from_static(b"\x00\x01"))
        .unwrap();
    assert_eq!(host.object("assets", "a").unwrap(), "text value");
    assert_eq!(host.object("assets", "b").unwrap(), &b"\x00\x01"[..]);
}

#[test]
fn object_entry_json() {
    let mut host = InMemoryHost::new();
    host.add_object_store("kv", btree! { "cfg" => Bytes::from(r#"{"ttl":60}"#) });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "kv").unwrap();

    let mut entry = store.lookup(&mut host, "cfg").unwrap().unwrap();
    let value: serde_json::Value = entry.json(&mut streams, &mut host).unwrap();
    assert_eq!(value["ttl"], 60);
}

#[test]
fn object_store_key_rules_apply_before_host() {
    let mut host = InMemoryHost::new();
    host.add_object_store("kv", btree! { "x" => Bytes::from("1") });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "kv").unwrap();
    host.clear_calls();

    for key in ["", ".", "..", "a#b", "line\nbreak", ".well-known/acme-challenge/x"] {
        assert!(store.lookup(&mut host, key).is_err());
        assert!(store.put(&mut streams, &mut host, key, "v").is_err());
    }
    assert!(store.lookup(&mut host, &"k".repeat(1025)).is_err());
    assert_eq!(host.total_calls(), 0);
}

#[test]
fn put_host_body_appends_on_host() {
    let mut host = InMemoryHost::new();
    host.add_object_store("kv", btree! { "x" => Bytes::from("1") });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "kv").unwrap();
    let mut body = Body::from_handle(host.add_body("request payload"));

    store.put(&mut streams, &mut host, "copy", &mut body).unwrap();
    assert_eq!(host.object("kv", "copy").unwrap(), "request payload");
    assert_eq!(host.call_count(HostOp::BodyAppend), 1);
    assert_eq!(host.call_count(HostOp::BodyRead), 0);
    assert!(body.is_used());

    let err = store.put(&mut streams, &mut host, "again", &mut body).unwrap_err();
    assert_eq!(err, ScriptError::type_error("body has already been used"));
}

struct Chunks(Vec<&'static str>);

impl UnderlyingSource for Chunks {
    fn pull(&mut self, controller: &mut ReadableController) -> StreamResult<()> {
        match self.0.pop() {
            Some(chunk) => controller.enqueue(Bytes::from_static(chunk.as_bytes())),
            None => controller.close(),
        }
    }
}

#[test]
fn put_stream_body_reads_through_guest() {
    let mut host = InMemoryHost::new();
    host.add_object_store("kv", btree! { "x" => Bytes::from("1") });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "kv").unwrap();
    let source = streams.script_source(Box::new(Chunks(vec!["b", "a"])), 0);
    let mut body = Body::from_stream(&mut streams, source).unwrap();

    store.put(&mut streams, &mut host, "streamed", &mut body).unwrap();
    assert_eq!(host.object("kv", "streamed").unwrap(), "ab");
    assert_eq!(host.call_count(HostOp::BodyAppend), 0);
    assert!(body.is_used());
}

#[test]
fn host_failure_on_insert_names_operation() {
    let mut host = InMemoryHost::new();
    host.add_object_store("kv", btree! { "x" => Bytes::from("1") });
    let mut streams = Streams::default();
    let store = ObjectStore::open(&mut host, "kv").unwrap();
    host.fail_next(HostOp::ObjectStoreInsert, HostError::Generic);

    let err = store.put(&mut streams, &mut host, "k", "v").unwrap_err();
    assert_eq!(err, ScriptError::error("object_store_insert failed: host error"));
}
