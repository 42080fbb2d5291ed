//! DB / Scanner Abstraction
//!
//! All commands flow through the [`Db`] capability. `execute` runs the command
//! eagerly and hands back a [`Scanner`] that only defers *decoding*:
//!
//! ```text
//!   caller ──execute(ctx, "GET", args)──> outer middleware ──> ... ──> Backend ──> Transport
//!                                                                        │
//!   caller <───────────── BoxScanner (outcome already obtained) ─────────┘
//!   scanner.scan(dests![..])  ──> decode engine
//! ```
//!
//! Middlewares are ordinary `Db` implementations holding the next stage. They
//! expose it through [`Db::inner`], which is what [`layers`] walks.

use crate::args::Arg;
use crate::context::Context;
use crate::decode::{decode, Dest};
use crate::error::{Error, Result};
use crate::middleware::prefix::PrefixDb;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

/// A deferred-decode handle bound to one command's outcome.
pub trait Scanner: Send {
    /// Decodes the outcome into `dests`.
    ///
    /// With no destinations only the command's own error (if any) is
    /// reported. Otherwise an absent value is [`Error::Empty`] and anything
    /// else goes through the decode engine.
    fn scan(self: Box<Self>, dests: &mut [Dest<'_>]) -> Result<()>;
}

/// Boxed scanner returned by every `execute`.
pub type BoxScanner = Box<dyn Scanner + Send>;

/// Shared handle to a DB capability.
pub type DbRef = Arc<dyn Db>;

/// The command capability every layer implements.
#[async_trait]
pub trait Db: Send + Sync {
    /// Executes `cmd` with `args` and returns the deferred-decode handle.
    async fn execute(&self, ctx: &Context, cmd: &str, args: Vec<Arg>) -> BoxScanner;

    /// Releases the resources held by this layer and the ones below it.
    async fn close(&self) -> Result<()>;

    /// The immediately wrapped DB, for middleware layers.
    fn inner(&self) -> Option<&DbRef> {
        None
    }

    /// This layer as a prefix layer, so a new prefix wrap can merge with it.
    fn prefix_layer(&self) -> Option<&PrefixDb> {
        None
    }

    /// The namespace segment this layer prepends to keys, if any.
    fn prefix_segment(&self) -> Option<&str> {
        self.prefix_layer().map(PrefixDb::prefix)
    }
}

/// Builds a decorator around a DB.
pub trait MiddlewareFactory: Send + Sync {
    fn wrap(&self, next: DbRef) -> DbRef;
}

/// Walks the chain from `db` down to the innermost layer.
pub fn layers(db: &dyn Db) -> Layers<'_> {
    Layers { next: Some(db) }
}

/// Iterator returned by [`layers`].
pub struct Layers<'a> {
    next: Option<&'a dyn Db>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a dyn Db;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.inner().map(|db| db.as_ref());
        Some(current)
    }
}

/// Scanner over a transport outcome.
pub struct ResultScanner {
    result: Result<Value>,
}

impl ResultScanner {
    pub fn new(result: Result<Value>) -> Self {
        Self { result }
    }
}

impl Scanner for ResultScanner {
    fn scan(self: Box<Self>, dests: &mut [Dest<'_>]) -> Result<()> {
        scan_value(&self.result?, dests)
    }
}

fn scan_value(value: &Value, dests: &mut [Dest<'_>]) -> Result<()> {
    if dests.is_empty() {
        return Ok(());
    }
    if value.is_absent() {
        return Err(Error::Empty);
    }
    decode(value, dests)
}

/// Scanner that only reports an error, whatever the destinations.
pub struct ErrScanner(pub Error);

impl Scanner for ErrScanner {
    fn scan(self: Box<Self>, _dests: &mut [Dest<'_>]) -> Result<()> {
        Err(self.0)
    }
}

/// Scanner over a value synthesized by a middleware.
pub struct StaticScanner(pub Value);

impl Scanner for StaticScanner {
    fn scan(self: Box<Self>, dests: &mut [Dest<'_>]) -> Result<()> {
        scan_value(&self.0, dests)
    }
}
