//! # keyshape - Composable Key-Value Client Core
//!
//! keyshape is the client-side core for RESP key-value stores: one
//! command-execution capability ([`Db`]), a decode engine that turns
//! dynamically shaped replies into typed Rust destinations, and a
//! middleware layer that wraps a [`Db`] with logging or key namespacing.
//!
//! ## Features
//!
//! - **Typed Decoding**: scan replies into `String`, integers, floats, `bool`,
//!   `Option<T>`, `Vec<T>`, `HashMap<K, V>` or a dynamic [`Value`]
//! - **Middlewares**: decorators that compose in any order and stay
//!   introspectable through [`layers`]
//! - **Key Namespacing**: the prefix middleware rewrites every key a command
//!   touches and refuses commands it does not know
//! - **Async I/O**: built on Tokio, with a pooled RESP transport and an
//!   in-process store for tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               keyshape                                  │
//! │                                                                         │
//! │   caller ──execute(ctx, cmd, args)──> Db ──> Scanner ──scan(dests)──>   │
//! │                                       │                                 │
//! │            ┌──────────────────────────┼──────────────────────┐          │
//! │            │  middleware (optional, any order)               │          │
//! │            │  ┌──────────┐   ┌──────────┐                    │          │
//! │            │  │  prefix  │──>│  logger  │──> ...             │          │
//! │            │  └──────────┘   └──────────┘                    │          │
//! │            └──────────────────────────┬──────────────────────┘          │
//! │                                       ▼                                 │
//! │                              ┌─────────────────┐                        │
//! │                              │     Backend     │                        │
//! │                              │ (arg encoding)  │                        │
//! │                              └────────┬────────┘                        │
//! │                       ┌───────────────┴───────────────┐                 │
//! │                       ▼                               ▼                 │
//! │              ┌─────────────────┐            ┌─────────────────┐         │
//! │              │  RespTransport  │            │ MemoryTransport │         │
//! │              │  (pooled, RESP) │            │  (in-process)   │         │
//! │              └─────────────────┘            └─────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use keyshape::memory::MemoryTransport;
//! use keyshape::middleware::LoggerFactory;
//! use keyshape::open::{open_with, Options};
//! use keyshape::{args, dests, Context, Db};
//!
//! # tokio_test::block_on(async {
//! let db = open_with(
//!     Options::new()
//!         .with_prefix("users")
//!         .with_middleware(LoggerFactory::debug()),
//!     MemoryTransport::new().into_backend(),
//! )
//! .unwrap();
//!
//! let ctx = Context::background();
//! db.execute(&ctx, "SET", args!["alice", 42]).await.scan(dests![]).unwrap();
//!
//! let mut age = 0u32;
//! db.execute(&ctx, "GET", args!["alice"]).await.scan(dests![age]).unwrap();
//! assert_eq!(age, 42);
//! # });
//! ```
//!
//! ## Module Overview
//!
//! - [`db`]: the [`Db`] capability, scanners and middleware factories
//! - [`decode`]: destinations and the conversion rules
//! - [`value`] / [`args`]: reply values and command arguments
//! - [`middleware`]: logger and prefix middlewares
//! - [`backend`]: argument encoding, configuration and the RESP transport
//! - [`memory`]: in-process store answering the same commands
//! - [`open`]: assembles a chain from options or a connection URL
//! - [`protocol`]: RESP parser and frame types
//! - [`context`]: cancellation and deadlines
//!
//! ## Design Highlights
//!
//! ### Errors as Values
//!
//! `execute` never fails directly: every failure travels inside the returned
//! scanner and surfaces from `scan`, so a chain reads the same whether the
//! error came from argument resolution, a middleware or the store.
//!
//! ### Strict Destination Counts
//!
//! A sequence reply scanned into several destinations must have exactly one
//! element per destination; any other count is [`Error::MultiValue`].

pub mod args;
pub mod backend;
pub mod context;
pub mod db;
pub mod decode;
pub mod error;
pub mod memory;
pub mod middleware;
pub mod open;
pub mod protocol;
pub mod value;

// Re-export commonly used types for convenience
pub use args::{Arg, Valuer};
pub use context::Context;
pub use db::{layers, BoxScanner, Db, DbRef, MiddlewareFactory, Scanner};
pub use decode::{Dest, Scan};
pub use error::{ConversionError, Error, Result, TransportError};
pub use protocol::{ParseError, RespParser, RespValue};
pub use value::Value;

/// Version of keyshape
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
