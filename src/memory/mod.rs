//! In-Process Store
//!
//! [`MemoryTransport`] answers commands from a sharded in-memory keyspace
//! instead of a server. It speaks the same reply frames a server would, so a
//! chain built on it behaves like one built on
//! [`RespTransport`](crate::backend::RespTransport): nil replies come back
//! absent, error replies become [`TransportError::Server`].
//!
//! Clones share the keyspace, which lets a test look at the raw keys through
//! an unprefixed chain while the code under test uses a prefixed one.
//!
//! [`TransportError::Server`]: crate::error::TransportError::Server

pub mod commands;
pub mod store;

pub use commands::CommandHandler;
pub use store::{glob_match, Data, Entry, Store};

use crate::backend::{Backend, Transport};
use crate::context::Context;
use crate::error::Result;
use crate::value::Value;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// A [`Transport`] backed by an in-process [`Store`].
#[derive(Clone, Default)]
pub struct MemoryTransport {
    handler: CommandHandler,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over an existing keyspace.
    pub fn with_store(store: Arc<Store>) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        self.handler.store()
    }

    /// Wraps this transport in a [`Backend`], ready to be used as a `Db`.
    pub fn into_backend(self) -> Backend<Self> {
        Backend::new(self)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn call(&self, ctx: &Context, parts: Vec<Bytes>) -> Result<Value> {
        ctx.check()?;
        let reply = self.handler.execute(&parts);
        Ok(Value::try_from(reply)?)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::error::{Error, TransportError};
    use crate::{args, dests};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_round_trip_through_backend() {
        let db = MemoryTransport::new().into_backend();
        let ctx = Context::background();

        db.execute(&ctx, "SET", args!["greeting", "hello"])
            .await
            .scan(dests![])
            .unwrap();

        let mut out = String::new();
        db.execute(&ctx, "GET", args!["greeting"])
            .await
            .scan(dests![out])
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_hgetall_decodes_into_map() {
        let db = MemoryTransport::new().into_backend();
        let ctx = Context::background();

        db.execute(&ctx, "HSET", args!["h", "a", 1, "b", 2])
            .await
            .scan(dests![])
            .unwrap();

        let mut out: HashMap<String, i64> = HashMap::new();
        db.execute(&ctx, "HGETALL", args!["h"])
            .await
            .scan(dests![out])
            .unwrap();
        assert_eq!(out.get("a"), Some(&1));
        assert_eq!(out.get("b"), Some(&2));
    }

    #[tokio::test]
    async fn test_error_reply_is_server_error() {
        let transport = MemoryTransport::new();
        let err = transport
            .call(&Context::background(), vec![Bytes::from("NOPE")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Server(_))));
    }

    #[tokio::test]
    async fn test_cancelled_context_is_rejected() {
        let transport = MemoryTransport::new();
        let ctx = Context::background();
        ctx.cancel();

        let err = transport
            .call(&ctx, vec![Bytes::from("PING")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_clones_share_keyspace() {
        let a = MemoryTransport::new();
        let b = a.clone();
        tokio_test::block_on(a.call(
            &Context::background(),
            vec![Bytes::from("SET"), Bytes::from("k"), Bytes::from("v")],
        ))
        .unwrap();

        assert!(b.store().exists(b"k"));
    }
}
