use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::parser::{IncrementalParser, JsonParser};
use crate::serializer::{CompactJson, Serializer};
use crate::session::{Progress, SessionId, TransformEvent, TransformSession};
use crate::sink::BufferedSink;
use crate::source::{BufferedSource, UpstreamSignal};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to read upstream body: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write downstream body: {0}")]
    Write(#[source] std::io::Error),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct TransformReport {
    /// Bytes read from the upstream, trailing content included.
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub discarded_trailing: u64,
    pub reads: u64,
}

/// Crushes one JSON document from `reader` into `writer`.
pub async fn transform_stream<R, W>(
    reader: R,
    writer: W,
    config: &TransformConfig,
) -> Result<TransformReport, DriverError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let parser = JsonParser::new(config.limits);
    let mut session = TransformSession::new(SessionId(0), parser, CompactJson);
    AsyncTransformDriver::new(reader, writer, config.read_chunk_bytes)
        .run(&mut session)
        .await
}

/// Connects a session to tokio I/O: upstream reads happen only when the
/// session asks for more input, and the single output write is performed
/// when the session issues it.
pub struct AsyncTransformDriver<R, W> {
    reader: R,
    writer: W,
    chunk: Vec<u8>,
    source: BufferedSource,
    sink: BufferedSink,
    reads: u64,
}

impl<R, W> AsyncTransformDriver<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, read_chunk_bytes: usize) -> Self {
        Self::with_source(reader, writer, read_chunk_bytes, BufferedSource::new())
    }

    /// Uses a prepared source, e.g. one with a declared body length.
    pub fn with_source(
        reader: R,
        writer: W,
        read_chunk_bytes: usize,
        source: BufferedSource,
    ) -> Self {
        Self {
            reader,
            writer,
            chunk: vec![0; read_chunk_bytes.max(1)],
            source,
            sink: BufferedSink::new(),
            reads: 0,
        }
    }

    /// Drives `session` to completion and releases it.
    pub async fn run<P, S>(
        mut self,
        session: &mut TransformSession<P, S>,
    ) -> Result<TransformReport, DriverError>
    where
        P: IncrementalParser,
        S: Serializer<P::Value>,
    {
        let mut event = TransformEvent::Immediate;
        loop {
            let progress = session.handle(event, &mut self.source, &mut self.sink)?;
            event = match progress {
                Progress::AwaitingInput => {
                    if let Some(UpstreamSignal::Ready) | None = self.source.take_signal() {
                        if let Err(err) = self.fill().await {
                            // The read error is what the caller sees; the
                            // session's own `Aborted` only goes upstream.
                            let aborted = session.on_error(&mut self.source);
                            debug!(?aborted, "session aborted after upstream read failure");
                            return Err(err);
                        }
                    }
                    TransformEvent::WriteReady
                }
                Progress::AwaitingSink => TransformEvent::Immediate,
                Progress::Writing => {
                    self.flush_pending().await?;
                    TransformEvent::WriteComplete
                }
                Progress::Finished => {
                    if self.sink.is_write_shut_down() {
                        self.writer.shutdown().await.map_err(DriverError::Write)?;
                    }
                    break;
                }
                Progress::Failed | Progress::Released => {
                    let err = session
                        .failure()
                        .cloned()
                        .unwrap_or(TransformError::Aborted);
                    return Err(err.into());
                }
            };
        }

        let stats = session.stats();
        session.release();
        let report = TransformReport {
            input_bytes: self.source.received(),
            output_bytes: stats.output_bytes,
            discarded_trailing: stats.discarded_trailing,
            reads: self.reads,
        };
        debug!(?report, "stream transform finished");
        Ok(report)
    }

    async fn fill(&mut self) -> Result<(), DriverError> {
        let n = self
            .reader
            .read(&mut self.chunk)
            .await
            .map_err(DriverError::Read)?;
        self.reads += 1;
        if n == 0 {
            self.source.close_input();
        } else {
            self.source.push(&self.chunk[..n]);
        }
        Ok(())
    }

    async fn flush_pending(&mut self) -> Result<(), DriverError> {
        let Some(mut pending) = self.sink.take_pending() else {
            return Ok(());
        };
        self.writer
            .write_all(pending.chunk())
            .await
            .map_err(DriverError::Write)?;
        pending.consume(pending.remaining());
        self.writer.flush().await.map_err(DriverError::Write)
    }
}
