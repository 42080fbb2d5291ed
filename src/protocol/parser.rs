//! Incremental RESP Reply Parser
//!
//! This module parses replies coming back from a RESP speaking store.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! The transport appends socket reads to a `BytesMut`, calls `parse()`, and
//! advances the buffer by `consumed` once a complete reply is available.
//!
//! Both RESP2 and RESP3 replies are understood. RESP3 sets and push frames are
//! surfaced as arrays, verbatim strings as bulk strings and big numbers as
//! simple strings.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid double format
    #[error("invalid double: {0}")]
    InvalidDouble(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Aggregate length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum aggregate nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP reply parser.
///
/// # Example
///
/// ```
/// use keyshape::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let (value, consumed) = parser.parse(b"+OK\r\n").unwrap().unwrap();
/// assert_eq!(value, RespValue::ok());
/// assert_eq!(consumed, 5);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for aggregate parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP reply from the buffer.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING | b'(' => {
                Ok(parse_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s), n)))
            }
            prefix::ERROR => Ok(parse_line(buf)?.map(|(s, n)| (RespValue::Error(s), n))),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            b'=' => self.parse_verbatim(buf),
            b'!' => self.parse_blob_error(buf),
            prefix::ARRAY | prefix::SET | prefix::PUSH => self.parse_array(buf),
            prefix::MAP => self.parse_map(buf),
            prefix::NULL => Ok(parse_line(buf)?.map(|(_, n)| (RespValue::Null, n))),
            prefix::BOOLEAN => self.parse_boolean(buf),
            prefix::DOUBLE => self.parse_double(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match parse_line(buf)? {
            Some((s, consumed)) => {
                let n: i64 = s
                    .parse()
                    .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
                Ok(Some((RespValue::Integer(n), consumed)))
            }
            None => Ok(None),
        }
    }

    /// Parses a double: `,<float>\r\n`
    fn parse_double(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match parse_line(buf)? {
            Some((s, consumed)) => {
                let f = match s.as_str() {
                    "inf" => f64::INFINITY,
                    "-inf" => f64::NEG_INFINITY,
                    other => other
                        .parse()
                        .map_err(|_| ParseError::InvalidDouble(other.to_string()))?,
                };
                Ok(Some((RespValue::Double(f), consumed)))
            }
            None => Ok(None),
        }
    }

    /// Parses a boolean: `#t\r\n` or `#f\r\n`
    fn parse_boolean(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        match parse_line(buf)? {
            Some((s, consumed)) => match s.as_str() {
                "t" => Ok(Some((RespValue::Boolean(true), consumed))),
                "f" => Ok(Some((RespValue::Boolean(false), consumed))),
                other => Err(ParseError::ProtocolError(format!(
                    "invalid boolean: {}",
                    other
                ))),
            },
            None => Ok(None),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(parse_blob(buf)?.map(|(data, consumed)| match data {
            Some(data) => (RespValue::BulkString(data), consumed),
            None => (RespValue::Null, consumed),
        }))
    }

    /// Parses a verbatim string: `=<length>\r\n<fmt>:<data>\r\n`
    fn parse_verbatim(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(parse_blob(buf)?.map(|(data, consumed)| match data {
            Some(data) if data.len() >= 4 => (RespValue::BulkString(data.slice(4..)), consumed),
            Some(data) => (RespValue::BulkString(data), consumed),
            None => (RespValue::Null, consumed),
        }))
    }

    /// Parses a blob error: `!<length>\r\n<message>\r\n`
    fn parse_blob_error(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(parse_blob(buf)?.map(|(data, consumed)| {
            let msg = data
                .map(|d| String::from_utf8_lossy(&d).into_owned())
                .unwrap_or_default();
            (RespValue::Error(msg), consumed)
        }))
    }

    /// Parses an array, set or push frame: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match parse_length(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let count = match count {
            None => return Ok(Some((RespValue::Null, consumed))),
            Some(count) => count,
        };

        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }

    /// Parses a map: `%<pairs>\r\n<key><value>...`
    fn parse_map(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match parse_length(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let count = match count {
            None => return Ok(Some((RespValue::Null, consumed))),
            Some(count) => count,
        };

        let mut pairs = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            let key = self.parse_value(&buf[consumed..])?;
            let Some((key, key_consumed)) = key else {
                self.depth -= 1;
                return Ok(None);
            };
            consumed += key_consumed;

            let value = self.parse_value(&buf[consumed..])?;
            let Some((value, value_consumed)) = value else {
                self.depth -= 1;
                return Ok(None);
            };
            consumed += value_consumed;

            pairs.push((key, value));
        }
        self.depth -= 1;

        Ok(Some((RespValue::Map(pairs), consumed)))
    }
}

/// Reads the CRLF terminated line after the prefix byte.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // +1 for prefix, +2 for CRLF
            Ok(Some((s.to_string(), 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Reads an aggregate header. `Some(None)` is the null aggregate.
fn parse_length(buf: &[u8]) -> ParseResult<Option<(Option<usize>, usize)>> {
    let Some((line, consumed)) = parse_line(buf)? else {
        return Ok(None);
    };

    let count: i64 = line
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;

    match count {
        -1 => Ok(Some((None, consumed))),
        n if n < 0 => Err(ParseError::InvalidArrayLength(n)),
        n => Ok(Some((Some(n as usize), consumed))),
    }
}

/// Reads a length-prefixed payload. `Some((None, _))` is the null blob.
fn parse_blob(buf: &[u8]) -> ParseResult<Option<(Option<Bytes>, usize)>> {
    let Some((line, header)) = parse_line(buf)? else {
        return Ok(None);
    };

    let length: i64 = line
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;

    if length == -1 {
        return Ok(Some((None, header)));
    }

    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = header + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[header + length..total_needed] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[header..header + length]);
    Ok(Some((Some(data), total_needed)))
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single RESP reply from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
