#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use jcrusher::{
    BufferedSink, BufferedSource, Feed, FlowControlledSink, FlowControlledSource,
    IncrementalParser, JsonParser, OutputReader, SinkError, TransformError, TransformLimits,
    UpstreamSignal,
};
use serde_json::Value;

pub const PRETTY_DOC: &str = r#"{
    "id": 42,
    "name": "crusher \"test\" {not a brace}",
    "tags": [ "a", "b" , "c" ],
    "nested": { "empty": [], "obj": {}, "n": null, "f": -1.25e3 },
    "ok": true
}"#;

pub const COMPACT_DOC: &str = r#"{"id":42,"name":"crusher \"test\" {not a brace}","tags":["a","b","c"],"nested":{"empty":[],"obj":{},"n":null,"f":-1250.0},"ok":true}"#;

/// What the wrapped parser was given, shared with the test body.
#[derive(Debug, Default)]
pub struct FeedLog {
    /// Bytes that belong to the document, in feed order.
    pub bytes: Vec<u8>,
    pub feeds: usize,
    pub completions: usize,
}

pub struct RecordingParser {
    inner: JsonParser,
    log: Rc<RefCell<FeedLog>>,
}

impl RecordingParser {
    pub fn new() -> (Self, Rc<RefCell<FeedLog>>) {
        Self::with_limits(TransformLimits::default())
    }

    pub fn with_limits(limits: TransformLimits) -> (Self, Rc<RefCell<FeedLog>>) {
        let log = Rc::new(RefCell::new(FeedLog::default()));
        (
            Self {
                inner: JsonParser::new(limits),
                log: Rc::clone(&log),
            },
            log,
        )
    }
}

impl IncrementalParser for RecordingParser {
    type Value = Value;

    fn feed(&mut self, span: &[u8]) -> Feed<Value> {
        let out = self.inner.feed(span);
        let mut log = self.log.borrow_mut();
        log.feeds += 1;
        match &out {
            Feed::Complete { consumed, .. } => {
                log.bytes.extend_from_slice(&span[..*consumed]);
                log.completions += 1;
            }
            _ => log.bytes.extend_from_slice(span),
        }
        out
    }

    fn finish(&mut self) -> Feed<Value> {
        let out = self.inner.finish();
        if matches!(out, Feed::Complete { .. }) {
            self.log.borrow_mut().completions += 1;
        }
        out
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// [`BufferedSource`] that keeps every signal it receives.
#[derive(Debug, Default)]
pub struct RecordingSource {
    pub inner: BufferedSource,
    pub signals: Vec<UpstreamSignal>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_declared_len(len: u64) -> Self {
        Self {
            inner: BufferedSource::with_declared_len(len),
            signals: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.inner.push(chunk);
    }

    pub fn last_signal(&self) -> Option<&UpstreamSignal> {
        self.signals.last()
    }

    pub fn errors(&self) -> usize {
        self.signals
            .iter()
            .filter(|s| matches!(s, UpstreamSignal::Error(_)))
            .count()
    }
}

impl FlowControlledSource for RecordingSource {
    fn bytes_remaining(&self) -> Option<u64> {
        self.inner.bytes_remaining()
    }

    fn available(&self) -> &[u8] {
        self.inner.available()
    }

    fn consume(&mut self, n: usize) {
        self.inner.consume(n);
    }

    fn add_done(&mut self, n: usize) {
        self.inner.add_done(n);
    }

    fn notify_ready(&mut self) {
        self.signals.push(UpstreamSignal::Ready);
    }

    fn notify_complete(&mut self) {
        self.signals.push(UpstreamSignal::Complete);
    }

    fn notify_error(&mut self, error: &TransformError) {
        self.signals.push(UpstreamSignal::Error(error.clone()));
    }
}

/// [`BufferedSink`] that keeps the bytes of every accepted write.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub inner: BufferedSink,
    pub written: Vec<Vec<u8>>,
    pub max_pending: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the downstream consuming the pending write.
    pub fn drain(&mut self) {
        if let Some(mut reader) = self.inner.take_pending() {
            reader.consume(reader.remaining());
        }
    }

    pub fn output(&self) -> String {
        self.written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }
}

impl FlowControlledSink for RecordingSink {
    fn write(&mut self, reader: OutputReader) -> Result<(), SinkError> {
        let bytes = reader.chunk().to_vec();
        self.inner.write(reader)?;
        self.written.push(bytes);
        self.max_pending = self.max_pending.max(usize::from(self.inner.has_pending()));
        Ok(())
    }

    fn shutdown_write(&mut self) {
        self.inner.shutdown_write();
    }
}
