//! Middlewares
//!
//! Decorators around a [`Db`](crate::db::Db), built by a
//! [`MiddlewareFactory`](crate::db::MiddlewareFactory):
//!
//! - `logger`: logs every command with its duration once it is scanned
//! - `prefix`: namespaces every key a command touches
//!
//! Factories compose in any order; each wrapped layer keeps a handle to the
//! next one and forwards `close` to it.

pub mod logger;
pub mod prefix;

pub use logger::{CommandLogger, LoggerFactory, TracingLogger};
pub use prefix::{prefix_of, PrefixDb, PrefixFactory};
