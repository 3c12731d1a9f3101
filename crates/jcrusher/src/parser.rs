use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::config::TransformLimits;
use crate::error::{ParseError, ParseErrorKind};

/// Outcome of handing one span (or end of input) to an [`IncrementalParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum Feed<V> {
    /// The span was absorbed; no value is complete yet.
    NeedMore,
    /// A value is complete. `consumed` is how many bytes of the span belong
    /// to it; anything after that was not absorbed.
    Complete { value: V, consumed: usize },
    Error(ParseError),
}

/// A parser that accepts a document in pieces.
///
/// `feed` is called with successive, non-overlapping spans in delivery order.
/// After it returns [`Feed::Complete`] or [`Feed::Error`] the parser must be
/// [`reset`](IncrementalParser::reset) before it is fed again.
pub trait IncrementalParser {
    type Value;

    fn feed(&mut self, span: &[u8]) -> Feed<Self::Value>;

    /// Signals end of input. Completes a value that only end of input can
    /// terminate (a bare top-level number, for example), otherwise reports
    /// [`ParseErrorKind::Incomplete`].
    fn finish(&mut self) -> Feed<Self::Value>;

    fn reset(&mut self);
}

/// Incremental JSON parser.
///
/// Bytes are scanned as they arrive to find where the top-level value ends
/// (tracking strings, escapes and bracket nesting); the buffered document is
/// then parsed once by `serde_json`. Structural errors and limit violations
/// are reported as soon as the offending byte is seen.
#[derive(Debug, Clone)]
pub struct JsonParser {
    limits: TransformLimits,
    buffer: Vec<u8>,
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
    in_scalar: bool,
    started: bool,
    done: bool,
}

enum Scan {
    Pending,
    Boundary(usize),
    Failed(ParseError),
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new(TransformLimits::default())
    }
}

impl JsonParser {
    pub fn new(limits: TransformLimits) -> Self {
        Self {
            limits,
            buffer: Vec::new(),
            closers: Vec::new(),
            in_string: false,
            escaped: false,
            in_scalar: false,
            started: false,
            done: false,
        }
    }

    /// Bytes absorbed so far for the current document.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn offset(&self, index: usize) -> u64 {
        (self.buffer.len() + index) as u64
    }

    fn scan(&mut self, span: &[u8]) -> Scan {
        for (index, &byte) in span.iter().enumerate() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    if self.closers.is_empty() {
                        return Scan::Boundary(index + 1);
                    }
                }
                continue;
            }

            if self.in_scalar {
                if is_delimiter(byte) {
                    return Scan::Boundary(index);
                }
                continue;
            }

            match byte {
                b' ' | b'\t' | b'\n' | b'\r' => {}
                b'"' => {
                    self.in_string = true;
                    self.started = true;
                }
                b'{' | b'[' => {
                    if self.closers.len() >= self.limits.max_depth {
                        return Scan::Failed(ParseError::new(
                            ParseErrorKind::TooDeep,
                            self.offset(index),
                            format!("nesting exceeds {} levels", self.limits.max_depth),
                        ));
                    }
                    self.closers.push(if byte == b'{' { b'}' } else { b']' });
                    self.started = true;
                }
                b'}' | b']' => match self.closers.pop() {
                    Some(expected) if expected == byte => {
                        if self.closers.is_empty() {
                            return Scan::Boundary(index + 1);
                        }
                    }
                    Some(expected) => {
                        return Scan::Failed(ParseError::new(
                            ParseErrorKind::Structure,
                            self.offset(index),
                            format!(
                                "expected `{}`, found `{}`",
                                expected as char, byte as char
                            ),
                        ));
                    }
                    None => {
                        return Scan::Failed(ParseError::new(
                            ParseErrorKind::Structure,
                            self.offset(index),
                            format!("unexpected `{}` before any value", byte as char),
                        ));
                    }
                },
                _ => {
                    if self.closers.is_empty() {
                        self.in_scalar = true;
                    }
                    self.started = true;
                }
            }
        }
        Scan::Pending
    }

    fn check_size(&self, additional: usize) -> Result<(), ParseError> {
        match self.limits.max_document_bytes {
            Some(max) if self.buffer.len() + additional > max => Err(ParseError::new(
                ParseErrorKind::TooLarge,
                self.offset(additional),
                format!("document exceeds {max} bytes"),
            )),
            _ => Ok(()),
        }
    }

    fn complete(&mut self, consumed: usize) -> Feed<Value> {
        let document = std::mem::take(&mut self.buffer);
        self.done = true;
        // Nesting is already bounded by `max_depth` in `scan`.
        let mut de = serde_json::Deserializer::from_slice(&document);
        de.disable_recursion_limit();
        let parsed = Value::deserialize(&mut de).and_then(|value| de.end().map(|()| value));
        match parsed {
            Ok(value) => {
                trace!(bytes = document.len(), "json document complete");
                Feed::Complete { value, consumed }
            }
            Err(err) => Feed::Error(ParseError::new(
                ParseErrorKind::Syntax,
                document.len() as u64,
                err.to_string(),
            )),
        }
    }
}

impl IncrementalParser for JsonParser {
    type Value = Value;

    fn feed(&mut self, span: &[u8]) -> Feed<Value> {
        if self.done {
            return Feed::Error(ParseError::new(
                ParseErrorKind::Structure,
                self.offset(0),
                "parser fed after the document ended",
            ));
        }

        match self.scan(span) {
            Scan::Pending => {
                if let Err(err) = self.check_size(span.len()) {
                    self.done = true;
                    return Feed::Error(err);
                }
                self.buffer.extend_from_slice(span);
                Feed::NeedMore
            }
            Scan::Boundary(end) => {
                if let Err(err) = self.check_size(end) {
                    self.done = true;
                    return Feed::Error(err);
                }
                self.buffer.extend_from_slice(&span[..end]);
                self.complete(end)
            }
            Scan::Failed(err) => {
                self.done = true;
                Feed::Error(err)
            }
        }
    }

    fn finish(&mut self) -> Feed<Value> {
        if self.done {
            return Feed::Error(ParseError::new(
                ParseErrorKind::Structure,
                self.offset(0),
                "parser finished after the document ended",
            ));
        }
        if self.in_scalar {
            return self.complete(0);
        }
        self.done = true;
        let message = if self.started {
            "input ended inside a value"
        } else {
            "input contained no value"
        };
        Feed::Error(ParseError::new(
            ParseErrorKind::Incomplete,
            self.offset(0),
            message,
        ))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.closers.clear();
        self.in_string = false;
        self.escaped = false;
        self.in_scalar = false;
        self.started = false;
        self.done = false;
    }
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b' ' | b'\t' | b'\n' | b'\r' | b'{' | b'}' | b'[' | b']' | b',' | b':' | b'"'
    )
}
