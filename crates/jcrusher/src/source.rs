use bytes::{Buf, BytesMut};

use crate::error::TransformError;

/// Signal sent back to the upstream producer's continuation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum UpstreamSignal {
    /// Send more.
    Ready,
    /// Everything needed has been consumed; stop sending.
    Complete,
    Error(TransformError),
}

/// Upstream side of a transform: a flow-controlled byte producer.
pub trait FlowControlledSource {
    /// Bytes the producer still intends to deliver. `None` once the producer
    /// has shut down; `Some(0)` at end of stream.
    fn bytes_remaining(&self) -> Option<u64>;

    /// Buffered, unconsumed bytes. May be shorter than `bytes_remaining`.
    fn available(&self) -> &[u8];

    /// Advances the read cursor. `n` never exceeds `available().len()`.
    fn consume(&mut self, n: usize);

    /// Advances the producer's count of completed bytes.
    fn add_done(&mut self, n: usize);

    fn notify_ready(&mut self);

    fn notify_complete(&mut self);

    fn notify_error(&mut self, error: &TransformError);
}

/// In-memory [`FlowControlledSource`] fed by a host that reads the real
/// upstream.
///
/// The length may be declared up front (a `Content-Length`) or left unknown
/// until [`close_input`](BufferedSource::close_input). The most recent signal
/// from the session is kept for the host to act on.
#[derive(Debug, Default)]
pub struct BufferedSource {
    buffer: BytesMut,
    declared_len: Option<u64>,
    received: u64,
    done: u64,
    input_closed: bool,
    shut_down: bool,
    signal: Option<UpstreamSignal>,
}

impl BufferedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_declared_len(len: u64) -> Self {
        Self {
            declared_len: Some(len),
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        self.received += chunk.len() as u64;
    }

    /// Marks the end of upstream input. A body shorter than its declared
    /// length means the producer went away, which is reported as shutdown.
    pub fn close_input(&mut self) {
        self.input_closed = true;
        if matches!(self.declared_len, Some(len) if self.received < len) {
            self.shut_down = true;
        }
    }

    /// The producer no longer wants events; the buffer becomes absent.
    pub fn shut_down(&mut self) {
        self.shut_down = true;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn done(&self) -> u64 {
        self.done
    }

    pub fn take_signal(&mut self) -> Option<UpstreamSignal> {
        self.signal.take()
    }

    pub fn signal(&self) -> Option<&UpstreamSignal> {
        self.signal.as_ref()
    }
}

impl FlowControlledSource for BufferedSource {
    fn bytes_remaining(&self) -> Option<u64> {
        if self.shut_down {
            return None;
        }
        let remaining = match self.declared_len {
            Some(len) => len.saturating_sub(self.done),
            None if self.input_closed => self.received - self.done,
            None => u64::MAX - self.done,
        };
        Some(remaining)
    }

    fn available(&self) -> &[u8] {
        if self.shut_down {
            return &[];
        }
        &self.buffer
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.advance(n);
    }

    fn add_done(&mut self, n: usize) {
        self.done += n as u64;
    }

    fn notify_ready(&mut self) {
        self.signal = Some(UpstreamSignal::Ready);
    }

    fn notify_complete(&mut self) {
        self.signal = Some(UpstreamSignal::Complete);
    }

    fn notify_error(&mut self, error: &TransformError) {
        self.signal = Some(UpstreamSignal::Error(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_length_counts_down_with_done_bytes() {
        let mut source = BufferedSource::with_declared_len(10);
        source.push(b"abcd");
        assert_eq!(source.bytes_remaining(), Some(10));
        assert_eq!(source.available(), b"abcd");

        source.consume(4);
        source.add_done(4);
        assert_eq!(source.bytes_remaining(), Some(6));
        assert!(source.available().is_empty());
    }

    #[test]
    fn unknown_length_resolves_at_close() {
        let mut source = BufferedSource::new();
        source.push(b"xy");
        assert!(source.bytes_remaining().unwrap() > 2);

        source.close_input();
        assert_eq!(source.bytes_remaining(), Some(2));
        source.consume(2);
        source.add_done(2);
        assert_eq!(source.bytes_remaining(), Some(0));
    }

    #[test]
    fn truncated_body_is_a_shutdown() {
        let mut source = BufferedSource::with_declared_len(100);
        source.push(b"{}");
        source.close_input();
        assert!(source.is_shut_down());
        assert_eq!(source.bytes_remaining(), None);
        assert!(source.available().is_empty());
    }

    #[test]
    fn keeps_latest_signal_until_taken() {
        let mut source = BufferedSource::new();
        source.notify_ready();
        source.notify_complete();
        assert_eq!(source.take_signal(), Some(UpstreamSignal::Complete));
        assert_eq!(source.take_signal(), None);
    }
}
