//! Error Types
//!
//! Every failure in this crate is returned as a value from `execute`/`scan`;
//! nothing here retries or panics on bad input.
//!
//! ## Taxonomy
//!
//! ```text
//! Error
//!  ├── Empty                  store answered "no value"
//!  ├── Conversion(..)         a single value could not be decoded
//!  │    ├── NullToNonNullable
//!  │    ├── Parse
//!  │    └── UnsupportedShape
//!  ├── MultiValue             destination count does not fit the result shape
//!  ├── UnsupportedCommand     no prefix executor registered
//!  ├── Arity                  wrong argument count for a rewritten command
//!  ├── ArgumentResolution     a deferred argument failed to resolve
//!  ├── Cancelled / DeadlineExceeded
//!  ├── Transport(..)          opaque, passed through from the transport
//!  └── Config                 bad connection settings
//! ```

use crate::protocol::ParseError;
use thiserror::Error;

/// Errors produced while decoding a single value into a single destination.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    /// An absent value was decoded into a destination that cannot be empty.
    #[error("converting absent value to {kind} is unsupported")]
    NullToNonNullable { kind: &'static str },

    /// The canonical text form of the source could not be parsed.
    #[error("converting {text:?} to a {kind}: {reason}")]
    Parse {
        text: String,
        kind: &'static str,
        reason: String,
    },

    /// No conversion exists between the two shapes.
    #[error("unsupported scan, storing {from} into {to}")]
    UnsupportedShape { from: &'static str, to: &'static str },
}

/// Errors raised by a transport (the component actually talking to the store).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that are not valid RESP
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The store answered with an error reply
    #[error("{0}")]
    Server(String),

    /// A dial/read/write deadline elapsed
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// No connection became available within the pool timeout
    #[error("connection pool timeout")]
    PoolTimeout,

    /// The transport was closed
    #[error("transport is closed")]
    Closed,
}

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The store returned no value for the command.
    #[error("empty")]
    Empty,

    /// A value could not be converted into its destination.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The number of destinations does not match the shape of the result.
    #[error("unsupported scan, storing {shape} into {destinations} destinations")]
    MultiValue {
        shape: &'static str,
        destinations: usize,
    },

    /// The prefix middleware has no executor for the command.
    #[error("prefix wrapping for cmd {0:?} not implemented")]
    UnsupportedCommand(String),

    /// A command received a number of arguments it cannot work with.
    #[error("invalid number of args for {cmd}: {given}")]
    Arity { cmd: String, given: usize },

    /// A deferred argument failed to produce its primitive value.
    #[error("argument resolution failed: {0}")]
    ArgumentResolution(String),

    /// The execution context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The execution context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Failure reported by the transport, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid connection configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for the "store returned no value" outcome.
    pub fn is_empty(&self) -> bool {
        matches!(self, Error::Empty)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_command_names_command() {
        let err = Error::UnsupportedCommand("HELLO".to_string());
        assert_eq!(
            err.to_string(),
            "prefix wrapping for cmd \"HELLO\" not implemented"
        );
    }

    #[test]
    fn test_parse_error_message() {
        let err = Error::from(ConversionError::Parse {
            text: "abc".to_string(),
            kind: "i64",
            reason: "invalid digit found in string".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "converting \"abc\" to a i64: invalid digit found in string"
        );
    }

    #[test]
    fn test_transport_error_passes_message_through() {
        let err = Error::from(TransportError::Server("ERR wrong type".to_string()));
        assert_eq!(err.to_string(), "ERR wrong type");
        assert!(!err.is_empty());
        assert!(Error::Empty.is_empty());
    }
}
