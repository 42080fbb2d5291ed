//! RESP Protocol Implementation
//!
//! This module provides the Redis Serialization Protocol (RESP) pieces the
//! network transport needs: request serialization and incremental reply
//! parsing.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser for RESP2/RESP3 replies
//!
//! ## Example
//!
//! ```
//! use keyshape::protocol::{parse_message, RespValue};
//! use bytes::Bytes;
//!
//! // Building a request
//! let request = RespValue::command(vec![Bytes::from("GET"), Bytes::from("name")]);
//! assert_eq!(request.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! // Parsing a reply
//! let (value, consumed) = parse_message(b"$4\r\nAriz\r\n").unwrap().unwrap();
//! assert_eq!(value, RespValue::bulk_string(Bytes::from("Ariz")));
//! assert_eq!(consumed, 10);
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
