//! Key Prefixing Middleware
//!
//! Namespaces every key a command touches so several logical clients can
//! share one keyspace. A prefix `app` becomes the segment `app:`; wrapping
//! with an empty prefix is a no-op.
//!
//! ## Composition
//!
//! Wrapping a prefix layer with another one merges the two into a single
//! layer. Wrapping with `a` then with `b` gives one layer with the segment
//! `a:b:`, so `key` is stored as `a:b:key`:
//!
//! ```text
//!   execute("GET", ["key"])
//!        │
//!   PrefixDb("a:b:")  ──>  GET a:b:key
//!        │
//!     Backend
//! ```
//!
//! The merged layer keeps the inner executor table with the outer factory's
//! overrides laid on top, so a command registered on either factory is
//! accepted. Layers separated by another middleware stay distinct;
//! [`prefix_of`] walks the chain and reports the effective prefix either way.
//!
//! ## Commands
//!
//! Only commands with a registered [`Executor`] are accepted; anything else
//! fails with [`Error::UnsupportedCommand`] instead of reaching the store
//! unprefixed.

mod executor;

pub use executor::{
    default_executors, escape_glob, Executor, ExecutorTable, FlushExecutor, IndexRewriter,
    KeyPositions, KeysExecutor, FLUSH_BATCH_SIZE,
};

use crate::args::Arg;
use crate::context::Context;
use crate::db::{layers, BoxScanner, Db, DbRef, ErrScanner, MiddlewareFactory};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Separator appended to every prefix segment.
pub const SEPARATOR: char = ':';

/// Factory for the prefixing layer.
#[derive(Clone)]
pub struct PrefixFactory {
    prefix: String,
    executors: Arc<ExecutorTable>,
    /// Executors registered through [`PrefixFactory::with_executor`]
    overrides: ExecutorTable,
}

impl PrefixFactory {
    /// Builds a factory for `prefix` over the default executor table.
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with(SEPARATOR) {
            prefix.push(SEPARATOR);
        }

        Self {
            prefix,
            executors: default_executors(),
            overrides: ExecutorTable::new(),
        }
    }

    /// Registers (or replaces) the executor for `cmd` on this factory only.
    pub fn with_executor(mut self, cmd: &str, executor: Arc<dyn Executor>) -> Self {
        let cmd = cmd.to_ascii_uppercase();
        Arc::make_mut(&mut self.executors).insert(cmd.clone(), Arc::clone(&executor));
        self.overrides.insert(cmd, executor);
        self
    }

    /// The normalized prefix segment.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl MiddlewareFactory for PrefixFactory {
    fn wrap(&self, next: DbRef) -> DbRef {
        if self.prefix.is_empty() {
            return next;
        }

        if let Some(layer) = next.prefix_layer() {
            let executors = if self.overrides.is_empty() {
                Arc::clone(&layer.executors)
            } else {
                let mut merged = ExecutorTable::clone(&layer.executors);
                merged.extend(
                    self.overrides
                        .iter()
                        .map(|(cmd, executor)| (cmd.clone(), Arc::clone(executor))),
                );
                Arc::new(merged)
            };

            return Arc::new(PrefixDb {
                next: Arc::clone(&layer.next),
                prefix: format!("{}{}", layer.prefix, self.prefix),
                executors,
            });
        }

        Arc::new(PrefixDb {
            next,
            prefix: self.prefix.clone(),
            executors: Arc::clone(&self.executors),
        })
    }
}

/// A DB whose keys live under a prefix.
pub struct PrefixDb {
    next: DbRef,
    prefix: String,
    executors: Arc<ExecutorTable>,
}

impl PrefixDb {
    /// The full segment this layer prepends, `a:b:` for merged layers.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn executors(&self) -> &ExecutorTable {
        &self.executors
    }
}

#[async_trait]
impl Db for PrefixDb {
    async fn execute(&self, ctx: &Context, cmd: &str, args: Vec<Arg>) -> BoxScanner {
        match self.executors.get(&cmd.to_ascii_uppercase()) {
            Some(executor) => {
                executor
                    .execute(ctx, self.next.as_ref(), &self.prefix, cmd, args)
                    .await
            }
            None => Box::new(ErrScanner(Error::UnsupportedCommand(cmd.to_string()))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.next.close().await
    }

    fn inner(&self) -> Option<&DbRef> {
        Some(&self.next)
    }

    fn prefix_layer(&self) -> Option<&PrefixDb> {
        Some(self)
    }
}

/// Effective key prefix of a DB chain, outermost segment last.
///
/// Returns an empty string when no layer prefixes keys.
pub fn prefix_of(db: &dyn Db) -> String {
    let mut segments: Vec<&str> = layers(db).filter_map(|layer| layer.prefix_segment()).collect();
    segments.reverse();
    segments.concat()
}
