use bytes::Bytes;

use crate::error::SinkError;

/// A serialized document plus a read cursor into it.
///
/// Clones share the underlying bytes, so handing a reader to the sink does
/// not copy the document.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OutputReader {
    data: Bytes,
    position: usize,
}

impl OutputReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, position: 0 }
    }

    /// Total length of the buffer, read or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn chunk(&self) -> &[u8] {
        &self.data[self.position..]
    }

    pub fn consume(&mut self, n: usize) {
        self.position += n.min(self.remaining());
    }
}

/// Downstream side of a transform: a flow-controlled byte consumer.
pub trait FlowControlledSink {
    /// Starts writing `reader.remaining()` bytes. Completion is reported
    /// later as a write-complete event, not by this call.
    fn write(&mut self, reader: OutputReader) -> Result<(), SinkError>;

    /// Half-closes the outbound side; nothing more will be written.
    fn shutdown_write(&mut self);
}

/// In-memory [`FlowControlledSink`] drained by a host.
///
/// Holds at most one pending write; a second write before the first is
/// taken is refused with [`SinkError::Busy`].
#[derive(Debug)]
pub struct BufferedSink {
    pending: Option<OutputReader>,
    writable: bool,
    closed: bool,
    write_shut_down: bool,
    writes: usize,
}

impl Default for BufferedSink {
    fn default() -> Self {
        Self {
            pending: None,
            writable: true,
            closed: false,
            write_shut_down: false,
            writes: 0,
        }
    }
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While not writable, writes fail with [`SinkError::WouldBlock`].
    pub fn set_writable(&mut self, writable: bool) {
        self.writable = writable;
    }

    /// The downstream connection went away.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn take_pending(&mut self) -> Option<OutputReader> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_write_shut_down(&self) -> bool {
        self.write_shut_down
    }

    /// Number of writes accepted.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl FlowControlledSink for BufferedSink {
    fn write(&mut self, reader: OutputReader) -> Result<(), SinkError> {
        if self.closed || self.write_shut_down {
            return Err(SinkError::Closed);
        }
        if !self.writable {
            return Err(SinkError::WouldBlock);
        }
        if self.pending.is_some() {
            return Err(SinkError::Busy);
        }
        self.pending = Some(reader);
        self.writes += 1;
        Ok(())
    }

    fn shutdown_write(&mut self) {
        self.write_shut_down = true;
    }
}
