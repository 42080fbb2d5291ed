//! Dynamic Value Model
//!
//! Whatever a store command returns is represented as a [`Value`]: a scalar,
//! an ordered sequence, an unordered mapping, or the absent marker. Values are
//! produced by transports and never mutated afterwards; decoding always copies
//! out of them.
//!
//! ## Canonical Text
//!
//! [`Value::as_string`] and [`Value::as_bytes`] define the one textual form
//! every scalar has. The decode engine parses numbers out of it and the prefix
//! middleware builds keys with it, so both sides agree on e.g. `42`, `1.5`
//! and `true` regardless of locale.

use crate::error::TransportError;
use crate::protocol::RespValue;
use bytes::Bytes;
use std::fmt;

/// A value of store-determined shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// UTF-8 text (status replies, simple strings)
    Text(String),
    /// Binary-safe payload (bulk strings)
    Bytes(Bytes),
    /// Signed integer reply
    Int(i64),
    /// Unsigned integer (only produced by callers, never by RESP)
    UInt(u64),
    /// Double reply
    Float(f64),
    /// Boolean reply
    Bool(bool),
    /// Ordered list of values
    Sequence(Vec<Value>),
    /// Key/value pairs; iteration order carries no meaning
    Mapping(Vec<(Value, Value)>),
    /// The store returned nothing
    #[default]
    Absent,
}

impl Value {
    /// The synthetic success reply (`OK`).
    pub fn ok() -> Self {
        Value::Text("OK".to_string())
    }

    /// Human readable name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Int(_) => "integer",
            Value::UInt(_) => "unsigned integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Absent => "absent",
        }
    }

    /// Returns true if this is the absent marker.
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Returns true for text, bytes, numbers and booleans.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Value::Sequence(_) | Value::Mapping(_) | Value::Absent
        )
    }

    /// Canonical text form.
    ///
    /// Text and bytes pass through (bytes are decoded lossily), numbers and
    /// booleans use their locale independent representation, anything else
    /// falls back to the generic display form.
    pub fn as_string(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => b.to_string(),
            other => other.to_string(),
        }
    }

    /// Canonical byte form, mirroring [`Value::as_string`] for scalars.
    ///
    /// Returns `None` for sequences, mappings and the absent marker.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Text(s) => Some(s.as_bytes().to_vec()),
            Value::Bytes(b) => Some(b.to_vec()),
            Value::Int(_) | Value::UInt(_) | Value::Float(_) | Value::Bool(_) => {
                Some(self.as_string().into_bytes())
            }
            _ => None,
        }
    }

    /// Attempts to borrow the text of a `Text` or UTF-8 `Bytes` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner sequence.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(values) => Some(values),
            _ => None,
        }
    }
}

/// Formats a float in its shortest round-trip form.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_infinite() {
        return if f.is_sign_positive() { "inf" } else { "-inf" }.to_string();
    }
    f.to_string()
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Sequence(values)
    }
}

impl TryFrom<RespValue> for Value {
    type Error = TransportError;

    /// Converts a reply frame into a value. Error replies, nested or not,
    /// become [`TransportError::Server`].
    fn try_from(reply: RespValue) -> Result<Self, Self::Error> {
        Ok(match reply {
            RespValue::SimpleString(s) => Value::Text(s),
            RespValue::Error(msg) => return Err(TransportError::Server(msg)),
            RespValue::Integer(n) => Value::Int(n),
            RespValue::BulkString(b) => Value::Bytes(b),
            RespValue::Null => Value::Absent,
            RespValue::Double(f) => Value::Float(f),
            RespValue::Boolean(b) => Value::Bool(b),
            RespValue::Array(items) => Value::Sequence(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            RespValue::Map(pairs) => Value::Mapping(
                pairs
                    .into_iter()
                    .map(|(k, v)| Ok((Value::try_from(k)?, Value::try_from(v)?)))
                    .collect::<Result<_, TransportError>>()?,
            ),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Bytes(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Value::Int(n) => write!(f, "(integer) {}", n),
            Value::UInt(n) => write!(f, "(integer) {}", n),
            Value::Float(v) => write!(f, "(double) {}", format_float(*v)),
            Value::Bool(b) => write!(f, "({})", b),
            Value::Absent => write!(f, "(nil)"),
            Value::Sequence(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
            Value::Mapping(pairs) => {
                if pairs.is_empty() {
                    return write!(f, "(empty map)");
                }
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}# {} => {}", i + 1, k, v)?;
                }
                Ok(())
            }
        }
    }
}
