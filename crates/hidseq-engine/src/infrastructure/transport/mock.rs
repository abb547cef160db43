//! In-memory transport for tests and `--dry-run`.
//!
//! Every written byte is appended to a `Mutex<Vec<u8>>`, so assertions can
//! decode exactly which frames reached the "device" and in what order.  The
//! transport is shared through an `Arc`: the engine owns one clone, the test
//! keeps another to inspect.
//!
//! # Simulating failures
//!
//! [`MockTransport::fail_next_writes`] makes the next `n` writes return an
//! I/O error, which exercises the reconnect path.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use hidseq_core::protocol::codec::decode_stream;
use hidseq_core::Frame;

use crate::application::device::{Transport, TransportError};

/// A transport that records writes instead of touching hardware.
#[derive(Debug, Default)]
pub struct MockTransport {
    bytes: Mutex<Vec<u8>>,
    open: AtomicBool,
    opens: AtomicU32,
    closes: AtomicU32,
    failing_writes: AtomicU32,
    /// When `true`, `open` fails.
    pub refuse_open: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the link open without counting it as an `open` call.
    pub fn open_now(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Raw bytes written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Frames written so far.  Malformed data decodes to an empty list.
    pub fn frames(&self) -> Vec<Frame> {
        decode_stream(&self.bytes()).unwrap_or_default()
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Transport for Arc<MockTransport> {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                port: "mock".to_string(),
                reason: "refused".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        if self.take_failure() {
            return Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        self.bytes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
