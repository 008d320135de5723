//! Streaming response sinks.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use crate::metrics;
use crate::transfer::TransferStatus;

/// Receives a transfer's response body as it arrives.
///
/// Chunks of one transfer are delivered in wire order on the event loop
/// thread. Any closure `FnMut(&[u8]) -> usize` is a sink.
pub trait StreamSink {
    /// Consume a chunk. Returning fewer than `chunk.len()` bytes aborts the
    /// transfer; no further chunks are delivered.
    fn on_data(&mut self, chunk: &[u8]) -> usize;

    /// Called exactly once when the transfer has been reaped.
    fn on_complete(&mut self, _status: &TransferStatus) {}
}

impl<F> StreamSink for F
where
    F: FnMut(&[u8]) -> usize,
{
    fn on_data(&mut self, chunk: &[u8]) -> usize {
        self(chunk)
    }
}

/// Accumulates a whole response body in memory.
///
/// # Example
///
/// ```rust,ignore
/// let (sink, body) = BodyCollector::new();
/// engine.submit(&mut reactor, "http://example.com/", sink)?;
/// run_until_idle(&mut reactor, &mut engine)?;
/// assert!(body.status().unwrap().is_success());
/// ```
pub struct BodyCollector {
    buf: BytesMut,
    limit: Option<usize>,
    shared: Rc<RefCell<Collected>>,
}

#[derive(Default)]
struct Collected {
    body: Option<Bytes>,
    status: Option<TransferStatus>,
    chunks: usize,
}

/// Read side of a [`BodyCollector`], kept by the caller.
#[derive(Clone)]
pub struct CollectedBody {
    shared: Rc<RefCell<Collected>>,
}

impl BodyCollector {
    pub fn new() -> (Self, CollectedBody) {
        Self::build(None)
    }

    /// Collector that aborts the transfer once the body would exceed `limit` bytes.
    pub fn with_limit(limit: usize) -> (Self, CollectedBody) {
        Self::build(Some(limit))
    }

    fn build(limit: Option<usize>) -> (Self, CollectedBody) {
        let shared = Rc::new(RefCell::new(Collected::default()));
        let sink = BodyCollector {
            buf: BytesMut::new(),
            limit,
            shared: Rc::clone(&shared),
        };
        (sink, CollectedBody { shared })
    }
}

impl StreamSink for BodyCollector {
    fn on_data(&mut self, chunk: &[u8]) -> usize {
        let room = match self.limit {
            Some(limit) => limit.saturating_sub(self.buf.len()),
            None => chunk.len(),
        };
        let n = chunk.len().min(room);
        self.buf.extend_from_slice(&chunk[..n]);
        self.shared.borrow_mut().chunks += 1;
        n
    }

    fn on_complete(&mut self, status: &TransferStatus) {
        let mut shared = self.shared.borrow_mut();
        shared.body = Some(self.buf.split().freeze());
        shared.status = Some(status.clone());
    }
}

impl CollectedBody {
    /// The body, once the transfer has completed (successfully or not).
    pub fn body(&self) -> Option<Bytes> {
        self.shared.borrow().body.clone()
    }

    /// The final status, once the transfer has been reaped.
    pub fn status(&self) -> Option<TransferStatus> {
        self.shared.borrow().status.clone()
    }

    /// Number of `on_data` calls seen so far.
    pub fn chunks(&self) -> usize {
        self.shared.borrow().chunks
    }

    pub fn is_done(&self) -> bool {
        self.shared.borrow().status.is_some()
    }
}

/// Wraps a user sink and accounts received bytes.
pub(crate) struct MeteredSink {
    inner: Box<dyn StreamSink>,
}

impl MeteredSink {
    pub(crate) fn boxed(inner: Box<dyn StreamSink>) -> Box<dyn StreamSink> {
        Box::new(MeteredSink { inner })
    }
}

impl StreamSink for MeteredSink {
    fn on_data(&mut self, chunk: &[u8]) -> usize {
        let consumed = self.inner.on_data(chunk);
        metrics::BYTES_RECEIVED.add(consumed as u64);
        consumed
    }

    fn on_complete(&mut self, status: &TransferStatus) {
        self.inner.on_complete(status);
    }
}

/// Shared end of a transfer's sink.
///
/// The transport feeds body chunks through one clone. The engine keeps
/// another and delivers the completion through it, whether or not the
/// transport managed to detach the transfer. Once completed, the sink
/// accepts no more data.
#[derive(Clone)]
pub struct SinkHandle {
    slot: Rc<RefCell<SinkSlot>>,
}

struct SinkSlot {
    sink: Box<dyn StreamSink>,
    done: bool,
}

impl SinkHandle {
    pub fn new(sink: Box<dyn StreamSink>) -> Self {
        SinkHandle {
            slot: Rc::new(RefCell::new(SinkSlot { sink, done: false })),
        }
    }

    /// Feed a chunk. Returns 0, aborting the transfer, after completion or
    /// when called re-entrantly from the sink itself.
    pub fn on_data(&self, chunk: &[u8]) -> usize {
        match self.slot.try_borrow_mut() {
            Ok(mut slot) if !slot.done => slot.sink.on_data(chunk),
            _ => 0,
        }
    }

    /// Deliver the final status. Only the first call reaches the sink.
    pub(crate) fn complete(&self, status: &TransferStatus) -> bool {
        let Ok(mut slot) = self.slot.try_borrow_mut() else {
            return false;
        };
        if slot.done {
            return false;
        }
        slot.done = true;
        slot.sink.on_complete(status);
        true
    }
}
