//! The real platform, reached through raw wasm imports.
//!
//! Every import returns a [`HostStatus`] and writes its outputs through
//! pointers into guest memory. Buffers handed to an import are locals of the
//! calling method and are dropped (or converted into the owned result) as
//! soon as the import returns.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{HostError, HostResult, HostStatus};
use crate::handle::{
    BodyHandle, DictionaryHandle, LogEndpointHandle, ObjectStoreHandle, ResourceHandle,
    INVALID_HANDLE,
};
use crate::host::{Host, HostOp};

/// Largest dictionary value the platform will return.
const DICTIONARY_VALUE_MAX: usize = 8000;

mod raw {
    use crate::error::HostStatus;

    #[link(wasm_import_module = "edge_dictionary")]
    extern "C" {
        #[link_name = "open"]
        pub fn dictionary_open(name_ptr: *const u8, name_len: usize, out: *mut u32)
            -> HostStatus;

        #[link_name = "get"]
        pub fn dictionary_get(
            dict: u32,
            key_ptr: *const u8,
            key_len: usize,
            value_ptr: *mut u8,
            value_max: usize,
            nwritten: *mut usize,
        ) -> HostStatus;
    }

    #[link(wasm_import_module = "edge_log")]
    extern "C" {
        #[link_name = "endpoint_get"]
        pub fn log_endpoint_get(name_ptr: *const u8, name_len: usize, out: *mut u32) -> HostStatus;

        #[link_name = "write"]
        pub fn log_write(
            endpoint: u32,
            msg_ptr: *const u8,
            msg_len: usize,
            nwritten: *mut usize,
        ) -> HostStatus;
    }

    #[link(wasm_import_module = "edge_body")]
    extern "C" {
        #[link_name = "new"]
        pub fn body_new(out: *mut u32) -> HostStatus;

        #[link_name = "read"]
        pub fn body_read(body: u32, buf: *mut u8, buf_len: usize, nread: *mut usize) -> HostStatus;

        #[link_name = "write"]
        pub fn body_write(body: u32, buf: *const u8, buf_len: usize, nwritten: *mut usize)
            -> HostStatus;

        #[link_name = "append"]
        pub fn body_append(dest: u32, src: u32) -> HostStatus;

        #[link_name = "close"]
        pub fn body_close(body: u32) -> HostStatus;

        #[link_name = "abandon"]
        pub fn body_abandon(body: u32) -> HostStatus;
    }

    #[link(wasm_import_module = "edge_object_store")]
    extern "C" {
        #[link_name = "open"]
        pub fn object_store_open(name_ptr: *const u8, name_len: usize, out: *mut u32) -> HostStatus;

        #[link_name = "lookup"]
        pub fn object_store_lookup(
            store: u32,
            key_ptr: *const u8,
            key_len: usize,
            body_out: *mut u32,
        ) -> HostStatus;

        #[link_name = "insert"]
        pub fn object_store_insert(
            store: u32,
            key_ptr: *const u8,
            key_len: usize,
            body: u32,
        ) -> HostStatus;
    }
}

/// The platform host. Zero-sized: all state lives on the other side of the
/// import boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmHost;

impl WasmHost {
    pub fn new() -> Self {
        Self
    }
}

fn finish(op: HostOp, status: HostStatus) -> HostResult<()> {
    let result = status.into_result();
    trace!(op = %op, status = status.0, ok = result.is_ok(), "host call");
    result
}

impl Host for WasmHost {
    fn dictionary_open(&mut self, name: &str) -> HostResult<DictionaryHandle> {
        let mut out = INVALID_HANDLE;
        let status = unsafe { raw::dictionary_open(name.as_ptr(), name.len(), &mut out) };
        finish(HostOp::DictionaryOpen, status)?;
        if out == INVALID_HANDLE {
            return Err(HostError::OptionalNone);
        }
        Ok(DictionaryHandle::from_raw(out))
    }

    fn dictionary_get(&mut self, dict: DictionaryHandle, key: &str) -> HostResult<String> {
        let mut buf = vec![0u8; DICTIONARY_VALUE_MAX];
        let mut nwritten = 0usize;
        let status = unsafe {
            raw::dictionary_get(
                dict.as_raw(),
                key.as_ptr(),
                key.len(),
                buf.as_mut_ptr(),
                buf.len(),
                &mut nwritten,
            )
        };
        finish(HostOp::DictionaryGet, status)?;
        buf.truncate(nwritten.min(DICTIONARY_VALUE_MAX));
        String::from_utf8(buf).map_err(|_| HostError::Generic)
    }

    fn log_endpoint_open(&mut self, name: &str) -> HostResult<LogEndpointHandle> {
        let mut out = INVALID_HANDLE;
        let status = unsafe { raw::log_endpoint_get(name.as_ptr(), name.len(), &mut out) };
        finish(HostOp::LogEndpointOpen, status)?;
        Ok(LogEndpointHandle::from_raw(out))
    }

    fn log_write(&mut self, endpoint: LogEndpointHandle, message: &str) -> HostResult<()> {
        let mut nwritten = 0usize;
        let status = unsafe {
            raw::log_write(
                endpoint.as_raw(),
                message.as_ptr(),
                message.len(),
                &mut nwritten,
            )
        };
        finish(HostOp::LogWrite, status)
    }

    fn body_new(&mut self) -> HostResult<BodyHandle> {
        let mut out = INVALID_HANDLE;
        let status = unsafe { raw::body_new(&mut out) };
        finish(HostOp::BodyNew, status)?;
        Ok(BodyHandle::from_raw(out))
    }

    fn body_read(&mut self, body: BodyHandle, max_len: usize) -> HostResult<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let mut nread = 0usize;
        let status =
            unsafe { raw::body_read(body.as_raw(), buf.as_mut_ptr(), buf.len(), &mut nread) };
        finish(HostOp::BodyRead, status)?;
        buf.truncate(nread.min(max_len));
        Ok(buf.freeze())
    }

    fn body_write(&mut self, body: BodyHandle, chunk: &[u8]) -> HostResult<()> {
        // One logical write: the import may accept a prefix, so keep handing it
        // the remainder until everything is taken.
        let mut offset = 0;
        while offset < chunk.len() {
            let rest = &chunk[offset..];
            let mut nwritten = 0usize;
            let status =
                unsafe { raw::body_write(body.as_raw(), rest.as_ptr(), rest.len(), &mut nwritten) };
            finish(HostOp::BodyWrite, status)?;
            if nwritten == 0 {
                return Err(HostError::Generic);
            }
            offset += nwritten;
        }
        Ok(())
    }

    fn body_append(&mut self, dest: BodyHandle, src: BodyHandle) -> HostResult<()> {
        let status = unsafe { raw::body_append(dest.as_raw(), src.as_raw()) };
        finish(HostOp::BodyAppend, status)
    }

    fn body_close(&mut self, body: BodyHandle) -> HostResult<()> {
        let status = unsafe { raw::body_close(body.as_raw()) };
        finish(HostOp::BodyClose, status)
    }

    fn body_abandon(&mut self, body: BodyHandle) -> HostResult<()> {
        let status = unsafe { raw::body_abandon(body.as_raw()) };
        finish(HostOp::BodyAbandon, status)
    }

    fn object_store_open(&mut self, name: &str) -> HostResult<ObjectStoreHandle> {
        let mut out = INVALID_HANDLE;
        let status = unsafe { raw::object_store_open(name.as_ptr(), name.len(), &mut out) };
        finish(HostOp::ObjectStoreOpen, status)?;
        if out == INVALID_HANDLE {
            return Err(HostError::OptionalNone);
        }
        Ok(ObjectStoreHandle::from_raw(out))
    }

    fn object_store_lookup(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
    ) -> HostResult<BodyHandle> {
        let mut out = INVALID_HANDLE;
        let status = unsafe {
            raw::object_store_lookup(store.as_raw(), key.as_ptr(), key.len(), &mut out)
        };
        finish(HostOp::ObjectStoreLookup, status)?;
        if out == INVALID_HANDLE {
            return Err(HostError::OptionalNone);
        }
        Ok(BodyHandle::from_raw(out))
    }

    fn object_store_insert(
        &mut self,
        store: ObjectStoreHandle,
        key: &str,
        body: BodyHandle,
    ) -> HostResult<()> {
        let status = unsafe {
            raw::object_store_insert(store.as_raw(), key.as_ptr(), key.len(), body.as_raw())
        };
        finish(HostOp::ObjectStoreInsert, status)
    }
}
