#![forbid(unsafe_code)]
//! Streaming response-body transform that re-serializes JSON without
//! insignificant whitespace.
//!
//! A [`TransformSession`] sits between a flow-controlled upstream
//! ([`FlowControlledSource`]) and a flow-controlled downstream
//! ([`FlowControlledSink`]). It is driven purely by events:
//! - While buffering, each write-ready event feeds the available span to an
//!   [`IncrementalParser`] and asks the upstream for more.
//! - The first complete value switches the session to emitting, exactly once;
//!   bytes after that value are dropped.
//! - Emitting serializes the value in one pass and issues one downstream
//!   write; write-complete half-closes the outbound side.
//! - Malformed input and end of input without a value fail the session; the
//!   original bytes are never forwarded.
//!
//! [`TransformEngine`] is the host-side registry: it runs admission at the
//! registered [`HookPoint`]s, keeps one session per connection and releases
//! it on close. With the `tokio` feature, [`transform_stream`] runs a whole
//! document from an `AsyncRead` into an `AsyncWrite`.

mod config;
mod eligibility;
mod engine;
mod error;
mod parser;
mod serializer;
mod session;
mod sink;
mod source;

#[cfg(feature = "tokio")]
mod driver;

pub use config::{
    EligibilityConfig, TransformConfig, TransformLimits, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_READ_CHUNK_BYTES,
};
pub use eligibility::{Admission, CacheLookup, Eligibility, HookPoint, ResponseMetadata};
pub use engine::{EngineBuilder, JsonEngine, TransformEngine};
pub use error::{ConfigError, ParseError, ParseErrorKind, SinkError, TransformError};
pub use parser::{Feed, IncrementalParser, JsonParser};
pub use serializer::{CompactJson, Serializer};
pub use session::{Phase, Progress, SessionId, SessionStats, TransformEvent, TransformSession};
pub use sink::{BufferedSink, FlowControlledSink, OutputReader};
pub use source::{BufferedSource, FlowControlledSource, UpstreamSignal};

#[cfg(feature = "tokio")]
pub use driver::{transform_stream, AsyncTransformDriver, DriverError, TransformReport};
