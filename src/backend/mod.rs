//! Backend
//!
//! The innermost [`Db`] of every chain. [`Backend`] resolves deferred
//! arguments, encodes every argument in its canonical byte form and hands the
//! command to a [`Transport`], the component that actually talks to a store.
//!
//! Two transports ship with the crate:
//!
//! - [`RespTransport`]: RESP over TCP or a unix socket, with a connection pool
//! - [`MemoryTransport`](crate::memory::MemoryTransport): an in-process store

pub mod config;
pub mod resp;

pub use config::{Config, Network};
pub use resp::RespTransport;

use crate::args::Arg;
use crate::context::Context;
use crate::db::{BoxScanner, Db, ErrScanner, ResultScanner};
use crate::error::Result;
use crate::value::Value;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

/// Executes encoded commands against a store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `parts` (command name first) and returns the decoded reply.
    ///
    /// A "no value" reply is `Ok(Value::Absent)`, error replies are
    /// [`TransportError::Server`](crate::error::TransportError::Server).
    async fn call(&self, ctx: &Context, parts: Vec<Bytes>) -> Result<Value>;

    async fn close(&self) -> Result<()>;
}

/// Adapts a [`Transport`] to the [`Db`] capability.
pub struct Backend<T> {
    transport: T,
}

impl<T: Transport> Backend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl Backend<RespTransport> {
    /// Backend over a pooled network transport.
    pub fn from_config(config: Config) -> Self {
        Self::new(RespTransport::new(config))
    }
}

/// Encodes a command line, resolving deferred arguments on the way.
fn encode(cmd: &str, args: Vec<Arg>) -> Result<Vec<Bytes>> {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(Bytes::copy_from_slice(cmd.as_bytes()));
    for arg in args {
        parts.push(arg.resolve()?.to_bytes());
    }
    Ok(parts)
}

#[async_trait]
impl<T: Transport> Db for Backend<T> {
    async fn execute(&self, ctx: &Context, cmd: &str, args: Vec<Arg>) -> BoxScanner {
        let parts = match encode(cmd, args) {
            Ok(parts) => parts,
            Err(e) => return Box::new(ErrScanner(e)),
        };

        trace!(cmd, args = parts.len() - 1, "Executing command");
        Box::new(ResultScanner::new(self.transport.call(ctx, parts).await))
    }

    async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Valuer;
    use crate::error::{Error, TransportError};
    use crate::{args, dests};
    use parking_lot::Mutex;

    /// Replays canned replies and records what was sent.
    #[derive(Default)]
    struct Canned {
        replies: Mutex<Vec<Result<Value>>>,
        sent: Mutex<Vec<Vec<Bytes>>>,
    }

    impl Canned {
        fn replying(reply: Result<Value>) -> Self {
            let canned = Canned::default();
            canned.replies.lock().push(reply);
            canned
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn call(&self, _ctx: &Context, parts: Vec<Bytes>) -> Result<Value> {
            self.sent.lock().push(parts);
            self.replies.lock().pop().unwrap_or(Ok(Value::Absent))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Later(i64);

    impl Valuer for Later {
        fn value(&self) -> std::result::Result<Arg, String> {
            if self.0 < 0 {
                Err("negative".to_string())
            } else {
                Ok(Arg::from(self.0))
            }
        }
    }

    #[tokio::test]
    async fn test_arguments_are_encoded_canonically() {
        let db = Backend::new(Canned::replying(Ok(Value::ok())));
        db.execute(
            &Context::background(),
            "SET",
            vec![Arg::from("k"), Arg::deferred(Later(7)), Arg::from(1.5)],
        )
        .await
        .scan(dests![])
        .unwrap();

        let sent = db.transport().sent.lock();
        assert_eq!(
            sent[0],
            vec![
                Bytes::from("SET"),
                Bytes::from("k"),
                Bytes::from("7"),
                Bytes::from("1.5")
            ]
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_skips_transport() {
        let db = Backend::new(Canned::default());
        let err = db
            .execute(&Context::background(), "SET", vec![Arg::deferred(Later(-1))])
            .await
            .scan(dests![])
            .unwrap_err();

        assert!(matches!(err, Error::ArgumentResolution(msg) if msg == "negative"));
        assert!(db.transport().sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_nil_reply_is_empty() {
        let db = Backend::new(Canned::default());
        let ctx = Context::background();

        assert!(db.execute(&ctx, "GET", args!["k"]).await.scan(dests![]).is_ok());

        let mut out = String::new();
        let err = db
            .execute(&ctx, "GET", args!["k"])
            .await
            .scan(dests![out])
            .unwrap_err();
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_passes_through() {
        let db = Backend::new(Canned::replying(Err(TransportError::Server(
            "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        )
        .into())));

        let err = db
            .execute(&Context::background(), "INCR", args!["k"])
            .await
            .scan(dests![])
            .unwrap_err();
        assert!(err.to_string().starts_with("WRONGTYPE"));
    }
}
