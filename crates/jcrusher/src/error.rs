use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionId;

/// Classification of an incremental parse failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ParseErrorKind {
    /// The bytes of a structurally complete value were not valid JSON.
    Syntax,
    /// A bracket or brace that cannot open or close a value at this point.
    Structure,
    /// Nesting exceeded `max_depth`.
    TooDeep,
    /// The document exceeded `max_document_bytes`.
    TooLarge,
    /// Input ended before a value was complete.
    Incomplete,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParseErrorKind::Syntax => "syntax",
            ParseErrorKind::Structure => "structure",
            ParseErrorKind::TooDeep => "too deep",
            ParseErrorKind::TooLarge => "too large",
            ParseErrorKind::Incomplete => "incomplete",
        };
        f.write_str(label)
    }
}

/// Failure reported by an [`IncrementalParser`](crate::IncrementalParser).
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{kind} error at byte {offset}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Offset into the document (not into the current span).
    pub offset: u64,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: u64, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }
}

/// Reasons a [`FlowControlledSink`](crate::FlowControlledSink) refuses a write.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum SinkError {
    /// Not writable yet; the write is retried on the next event.
    #[error("downstream is not writable yet")]
    WouldBlock,
    #[error("downstream connection is closed")]
    Closed,
    #[error("a downstream write is already outstanding")]
    Busy,
}

/// Typed failure of one transform session.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TransformError {
    #[error("document could not be parsed: {0}")]
    Parse(#[from] ParseError),
    #[error("input ended after {bytes_seen} bytes without a complete document")]
    EarlyShutdown { bytes_seen: u64 },
    #[error("downstream unavailable: {0}")]
    SinkUnavailable(#[source] SinkError),
    #[error("failed to serialize document: {message}")]
    Serialize { message: String },
    #[error("transform aborted by the upstream producer")]
    Aborted,
    #[error("no transform session registered for {0}")]
    UnknownSession(SessionId),
}

/// Errors raised while loading a [`TransformConfig`](crate::TransformConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode config from TOML: {source}")]
    TomlDecode {
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}
