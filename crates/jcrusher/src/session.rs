use std::fmt;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::error::{ParseErrorKind, SinkError, TransformError};
use crate::parser::{Feed, IncrementalParser};
use crate::serializer::Serializer;
use crate::sink::{FlowControlledSink, OutputReader};
use crate::source::FlowControlledSource;

/// Identity of the connection a session belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Phase {
    Buffering,
    Emitting,
}

/// Events a host delivers to a session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransformEvent {
    /// More input is available, or the upstream wants acknowledgment.
    WriteReady,
    /// Re-entry request with no specific I/O reason.
    Immediate,
    /// The upstream aborted.
    Error,
    /// The downstream consumed the session's output.
    WriteComplete,
    /// The downstream went away.
    SinkClosed,
    /// The connection is closing; release everything.
    Closed,
}

/// What a session is waiting for after handling an event.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Progress {
    /// Asked the upstream for more input.
    AwaitingInput,
    /// Output is ready but the downstream was not writable.
    AwaitingSink,
    /// The single downstream write is in flight.
    Writing,
    /// Output written and the outbound side half-closed.
    Finished,
    Failed,
    Released,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SessionStats {
    pub feeds: u64,
    /// Bytes that belong to the document, trailing bytes excluded.
    pub bytes_fed: u64,
    pub transitions: u32,
    pub writes_issued: u32,
    pub output_bytes: u64,
    /// Bytes after the first complete value that were dropped.
    pub discarded_trailing: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum WriteState {
    Idle,
    InFlight,
    Complete,
}

enum BufferStep {
    Wait(Progress),
    Transitioned,
}

/// State of one document moving from upstream to downstream.
///
/// Input is buffered into the parser until it reports a complete value; the
/// session then switches to emitting (once), serializes the value and issues
/// a single downstream write. Every handler is safe to call in any phase and
/// after [`release`](TransformSession::release).
pub struct TransformSession<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value>,
{
    id: SessionId,
    phase: Phase,
    parser: Option<P>,
    serializer: S,
    value: Option<P::Value>,
    output: Option<OutputReader>,
    write: WriteState,
    failure: Option<TransformError>,
    released: bool,
    stats: SessionStats,
}

impl<P, S> TransformSession<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value>,
{
    pub fn new(id: SessionId, parser: P, serializer: S) -> Self {
        Self {
            id,
            phase: Phase::Buffering,
            parser: Some(parser),
            serializer,
            value: None,
            output: None,
            write: WriteState::Idle,
            failure: None,
            released: false,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn value(&self) -> Option<&P::Value> {
        self.value.as_ref()
    }

    pub fn output(&self) -> Option<&OutputReader> {
        self.output.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn failure(&self) -> Option<&TransformError> {
        self.failure.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn write_in_flight(&self) -> bool {
        self.write == WriteState::InFlight
    }

    /// Number of owned resources (parser, value, output) still held.
    pub fn held_resources(&self) -> usize {
        usize::from(self.parser.is_some())
            + usize::from(self.value.is_some())
            + usize::from(self.output.is_some())
    }

    pub fn handle(
        &mut self,
        event: TransformEvent,
        source: &mut dyn FlowControlledSource,
        sink: &mut dyn FlowControlledSink,
    ) -> Result<Progress, TransformError> {
        match event {
            TransformEvent::WriteReady | TransformEvent::Immediate => self.drive(source, sink),
            TransformEvent::Error => self.on_error(source),
            TransformEvent::WriteComplete => Ok(self.on_write_complete(sink)),
            TransformEvent::SinkClosed => self.on_sink_closed(),
            TransformEvent::Closed => {
                self.release();
                Ok(Progress::Released)
            }
        }
    }

    /// Runs the current phase's step; a transition during buffering runs the
    /// emitting step in the same call.
    pub fn drive(
        &mut self,
        source: &mut dyn FlowControlledSource,
        sink: &mut dyn FlowControlledSink,
    ) -> Result<Progress, TransformError> {
        if let Some(progress) = self.settled() {
            return Ok(progress);
        }

        if self.phase == Phase::Buffering {
            let upstream_open = source.bytes_remaining().is_some();
            match self.buffer_step(source) {
                Ok(BufferStep::Wait(progress)) => return Ok(progress),
                Ok(BufferStep::Transitioned) => {}
                Err(err) => {
                    let notify = if upstream_open { Some(source) } else { None };
                    return Err(self.fail(err, notify));
                }
            }
        }

        match self.emit_step(sink) {
            Ok(progress) => Ok(progress),
            Err(err) => Err(self.fail(err, None)),
        }
    }

    pub fn on_write_complete(&mut self, sink: &mut dyn FlowControlledSink) -> Progress {
        if let Some(progress) = self.settled() {
            return progress;
        }
        match self.write {
            WriteState::InFlight => {
                self.write = WriteState::Complete;
                if let Some(output) = self.output.as_mut() {
                    output.consume(output.remaining());
                }
                sink.shutdown_write();
                debug!(
                    session = %self.id,
                    bytes = self.stats.output_bytes,
                    "downstream write complete; outbound side shut down"
                );
                Progress::Finished
            }
            WriteState::Complete => Progress::Finished,
            WriteState::Idle => {
                debug!(session = %self.id, "write-complete with no write outstanding; ignored");
                match self.phase {
                    Phase::Buffering => Progress::AwaitingInput,
                    Phase::Emitting => Progress::AwaitingSink,
                }
            }
        }
    }

    pub fn on_error(
        &mut self,
        source: &mut dyn FlowControlledSource,
    ) -> Result<Progress, TransformError> {
        if let Some(progress) = self.settled() {
            return Ok(progress);
        }
        Err(self.fail(TransformError::Aborted, Some(source)))
    }

    pub fn on_sink_closed(&mut self) -> Result<Progress, TransformError> {
        if let Some(progress) = self.settled() {
            return Ok(progress);
        }
        if self.write == WriteState::Complete {
            return Ok(Progress::Finished);
        }
        Err(self.fail(TransformError::SinkUnavailable(SinkError::Closed), None))
    }

    /// Drops the parser, the value and the output buffer, whichever exist.
    /// Safe to call in any phase and any number of times.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let parser = self.parser.take().is_some();
        let value = self.value.take().is_some();
        let output = self.output.take().is_some();
        debug!(
            session = %self.id,
            phase = ?self.phase,
            parser,
            value,
            output,
            "session released"
        );
    }

    fn settled(&self) -> Option<Progress> {
        if self.failure.is_some() {
            Some(Progress::Failed)
        } else if self.released {
            Some(Progress::Released)
        } else {
            None
        }
    }

    fn buffer_step(
        &mut self,
        source: &mut dyn FlowControlledSource,
    ) -> Result<BufferStep, TransformError> {
        let Some(remaining) = source.bytes_remaining() else {
            debug!(session = %self.id, "upstream shut down while buffering");
            let value = self.finish_parser()?;
            self.enter_emitting(value);
            return Ok(BufferStep::Transitioned);
        };

        if remaining == 0 {
            debug!(session = %self.id, bytes = self.stats.bytes_fed, "end of upstream input");
            let value = self.finish_parser()?;
            self.enter_emitting(value);
            source.notify_complete();
            return Ok(BufferStep::Transitioned);
        }

        let span = source.available();
        let to_read = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(span.len());
        if to_read == 0 {
            source.notify_ready();
            return Ok(BufferStep::Wait(Progress::AwaitingInput));
        }

        let Some(parser) = self.parser.as_mut() else {
            return Ok(BufferStep::Wait(Progress::Released));
        };
        self.stats.feeds += 1;
        match parser.feed(&span[..to_read]) {
            Feed::NeedMore => {
                self.stats.bytes_fed += to_read as u64;
                source.consume(to_read);
                source.add_done(to_read);
                source.notify_ready();
                Ok(BufferStep::Wait(Progress::AwaitingInput))
            }
            Feed::Complete { value, consumed } => {
                let consumed = consumed.min(to_read);
                let trailing = &span[consumed..to_read];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!(
                        session = %self.id,
                        bytes = trailing.len(),
                        "discarding content after the first complete document"
                    );
                }
                self.stats.bytes_fed += consumed as u64;
                self.stats.discarded_trailing += trailing.len() as u64;
                source.consume(to_read);
                self.enter_emitting(value);
                source.notify_complete();
                Ok(BufferStep::Transitioned)
            }
            Feed::Error(err) => Err(err.into()),
        }
    }

    fn finish_parser(&mut self) -> Result<P::Value, TransformError> {
        let bytes_seen = self.stats.bytes_fed;
        let Some(parser) = self.parser.as_mut() else {
            return Err(TransformError::EarlyShutdown { bytes_seen });
        };
        match parser.finish() {
            Feed::Complete { value, .. } => Ok(value),
            Feed::Error(err) if err.kind == ParseErrorKind::Incomplete => {
                Err(TransformError::EarlyShutdown { bytes_seen })
            }
            Feed::Error(err) => Err(err.into()),
            Feed::NeedMore => Err(TransformError::EarlyShutdown { bytes_seen }),
        }
    }

    fn enter_emitting(&mut self, value: P::Value) {
        if self.phase == Phase::Emitting {
            return;
        }
        self.phase = Phase::Emitting;
        self.value = Some(value);
        self.stats.transitions += 1;
        debug!(
            session = %self.id,
            bytes = self.stats.bytes_fed,
            feeds = self.stats.feeds,
            "document complete; switching to output"
        );
    }

    fn emit_step(&mut self, sink: &mut dyn FlowControlledSink) -> Result<Progress, TransformError> {
        match self.write {
            WriteState::InFlight => return Ok(Progress::Writing),
            WriteState::Complete => return Ok(Progress::Finished),
            WriteState::Idle => {}
        }
        let Some(value) = self.value.as_ref() else {
            return Ok(Progress::AwaitingInput);
        };

        if self.output.is_none() {
            let mut buffer = BytesMut::new();
            self.serializer.serialize(value, &mut buffer)?;
            self.stats.output_bytes = buffer.len() as u64;
            self.output = Some(OutputReader::new(buffer.freeze()));
        }
        let Some(reader) = self.output.clone() else {
            return Ok(Progress::AwaitingSink);
        };

        match sink.write(reader) {
            Ok(()) => {
                self.write = WriteState::InFlight;
                self.stats.writes_issued += 1;
                debug!(
                    session = %self.id,
                    bytes = self.stats.output_bytes,
                    "downstream write issued"
                );
                Ok(Progress::Writing)
            }
            Err(SinkError::WouldBlock) => {
                debug!(session = %self.id, "downstream not writable; output held");
                Ok(Progress::AwaitingSink)
            }
            Err(err) => Err(TransformError::SinkUnavailable(err)),
        }
    }

    /// Records the failure, tells the upstream (when it is still listening)
    /// and releases owned resources.
    fn fail(
        &mut self,
        error: TransformError,
        upstream: Option<&mut dyn FlowControlledSource>,
    ) -> TransformError {
        warn!(session = %self.id, phase = ?self.phase, error = %error, "transform failed");
        if let Some(source) = upstream {
            source.notify_error(&error);
        }
        self.failure = Some(error.clone());
        self.release();
        error
    }
}

impl<P, S> Drop for TransformSession<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value>,
{
    fn drop(&mut self) {
        self.release();
    }
}

impl<P, S> fmt::Debug for TransformSession<P, S>
where
    P: IncrementalParser,
    S: Serializer<P::Value>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformSession")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("write", &self.write)
            .field("failure", &self.failure)
            .field("released", &self.released)
            .field("stats", &self.stats)
            .finish()
    }
}
