//! Per-command key rewriting strategies.
//!
//! An [`Executor`] receives a command aimed at a prefixed DB and forwards a
//! rewritten version of it to the next layer. Most commands only need some of
//! their arguments prefixed ([`IndexRewriter`]); `KEYS` also rewrites its
//! result and `FLUSHDB` is emulated on top of `KEYS` + `DEL`.

use crate::args::Arg;
use crate::context::Context;
use crate::db::{BoxScanner, Db, ErrScanner, Scanner, StaticScanner};
use crate::decode::Dest;
use crate::dests;
use crate::error::{Error, Result};
use crate::value::Value;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Number of keys deleted per `DEL` call when flushing a namespace.
pub const FLUSH_BATCH_SIZE: usize = 1024;

/// A per-command rewrite strategy.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        ctx: &Context,
        next: &dyn Db,
        prefix: &str,
        cmd: &str,
        args: Vec<Arg>,
    ) -> BoxScanner;
}

/// Command name (upper case) to executor.
pub type ExecutorTable = HashMap<String, Arc<dyn Executor>>;

/// Which argument positions hold keys.
#[derive(Clone, Copy)]
pub enum KeyPositions {
    /// Exactly these indices
    Fixed(&'static [usize]),
    /// Every index the predicate accepts
    Matching(fn(usize, &Arg) -> bool),
}

impl KeyPositions {
    fn contains(&self, idx: usize, arg: &Arg) -> bool {
        match self {
            KeyPositions::Fixed(idxs) => idxs.contains(&idx),
            KeyPositions::Matching(pred) => pred(idx, arg),
        }
    }
}

/// Prefixes the key arguments and forwards the command; the result is
/// passed through untouched.
#[derive(Clone, Copy)]
pub struct IndexRewriter {
    keys: KeyPositions,
}

impl IndexRewriter {
    pub const fn fixed(idxs: &'static [usize]) -> Self {
        Self {
            keys: KeyPositions::Fixed(idxs),
        }
    }

    pub const fn matching(pred: fn(usize, &Arg) -> bool) -> Self {
        Self {
            keys: KeyPositions::Matching(pred),
        }
    }

    /// Rewrites `args`, prefixing every key position.
    pub fn rewrite(&self, prefix: &str, args: Vec<Arg>) -> Result<Vec<Arg>> {
        args.into_iter()
            .enumerate()
            .map(|(idx, arg)| {
                if self.keys.contains(idx, &arg) {
                    prefixed(prefix.as_bytes(), arg)
                } else {
                    Ok(arg)
                }
            })
            .collect()
    }
}

#[async_trait]
impl Executor for IndexRewriter {
    async fn execute(
        &self,
        ctx: &Context,
        next: &dyn Db,
        prefix: &str,
        cmd: &str,
        args: Vec<Arg>,
    ) -> BoxScanner {
        match self.rewrite(prefix, args) {
            Ok(args) => next.execute(ctx, cmd, args).await,
            Err(e) => Box::new(ErrScanner(e)),
        }
    }
}

/// Canonical bytes of `arg` behind `prefix`. Deferred arguments are resolved
/// first.
fn prefixed(prefix: &[u8], arg: Arg) -> Result<Arg> {
    let key = arg.resolve()?.to_bytes();
    let mut buf = BytesMut::with_capacity(prefix.len() + key.len());
    buf.put_slice(prefix);
    buf.put_slice(&key);
    Ok(Arg::Bytes(buf.freeze()))
}

/// Escapes glob metacharacters so the prefix only matches itself.
pub fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `KEYS pattern`: the pattern is prefixed, the prefix is stripped from every
/// returned key.
pub struct KeysExecutor;

#[async_trait]
impl Executor for KeysExecutor {
    async fn execute(
        &self,
        ctx: &Context,
        next: &dyn Db,
        prefix: &str,
        cmd: &str,
        args: Vec<Arg>,
    ) -> BoxScanner {
        let pattern = match <[Arg; 1]>::try_from(args) {
            Ok([pattern]) => pattern,
            Err(args) => {
                return Box::new(ErrScanner(Error::Arity {
                    cmd: cmd.to_string(),
                    given: args.len(),
                }))
            }
        };

        let pattern = match prefixed(escape_glob(prefix).as_bytes(), pattern) {
            Ok(pattern) => pattern,
            Err(e) => return Box::new(ErrScanner(e)),
        };

        Box::new(KeysScanner {
            inner: next.execute(ctx, cmd, vec![pattern]).await,
            prefix: Bytes::copy_from_slice(prefix.as_bytes()),
        })
    }
}

struct KeysScanner {
    inner: BoxScanner,
    prefix: Bytes,
}

impl Scanner for KeysScanner {
    fn scan(self: Box<Self>, dests: &mut [Dest<'_>]) -> Result<()> {
        let KeysScanner { inner, prefix } = *self;
        if dests.is_empty() {
            return inner.scan(dests);
        }

        let mut keys: Vec<Bytes> = Vec::new();
        inner.scan(dests![keys])?;

        let stripped = keys
            .into_iter()
            .map(|key| {
                if key.starts_with(&prefix) {
                    Value::Bytes(key.slice(prefix.len()..))
                } else {
                    Value::Bytes(key)
                }
            })
            .collect();

        Box::new(StaticScanner(Value::Sequence(stripped))).scan(dests)
    }
}

/// `FLUSHDB` restricted to the namespace: lists every prefixed key and
/// deletes them in batches of [`FLUSH_BATCH_SIZE`].
///
/// The first failing batch aborts the flush; batches already deleted stay
/// deleted. Cancellation is checked before every batch.
pub struct FlushExecutor;

impl FlushExecutor {
    async fn flush(&self, ctx: &Context, next: &dyn Db, prefix: &str) -> Result<usize> {
        ctx.check()?;

        let pattern = format!("{}*", escape_glob(prefix));
        let mut keys: Vec<Bytes> = Vec::new();
        next.execute(ctx, "KEYS", vec![Arg::Text(pattern)])
            .await
            .scan(dests![keys])?;

        for batch in keys.chunks(FLUSH_BATCH_SIZE) {
            ctx.check()?;

            let args = batch.iter().cloned().map(Arg::Bytes).collect();
            next.execute(ctx, "DEL", args).await.scan(dests![])?;
        }

        Ok(keys.len())
    }
}

#[async_trait]
impl Executor for FlushExecutor {
    async fn execute(
        &self,
        ctx: &Context,
        next: &dyn Db,
        prefix: &str,
        _cmd: &str,
        _args: Vec<Arg>,
    ) -> BoxScanner {
        match self.flush(ctx, next, prefix).await {
            Ok(deleted) => {
                debug!(prefix, deleted, "Flushed namespace");
                Box::new(StaticScanner(Value::ok()))
            }
            Err(e) => Box::new(ErrScanner(e)),
        }
    }
}

const KEY: IndexRewriter = IndexRewriter::fixed(&[0]);
const TWO_KEYS: IndexRewriter = IndexRewriter::fixed(&[0, 1]);
const NO_KEYS: IndexRewriter = IndexRewriter::fixed(&[]);
const ALL_KEYS: IndexRewriter = IndexRewriter::matching(|_, _| true);
const EVEN_KEYS: IndexRewriter = IndexRewriter::matching(|idx, _| idx % 2 == 0);

const STRING_COMMANDS: &[(&str, IndexRewriter)] = &[
    ("APPEND", KEY),
    ("DECR", KEY),
    ("DECRBY", KEY),
    ("GET", KEY),
    ("GETDEL", KEY),
    ("GETEX", KEY),
    ("GETSET", KEY),
    ("INCR", KEY),
    ("INCRBY", KEY),
    ("INCRBYFLOAT", KEY),
    ("LCS", KEY),
    ("MGET", ALL_KEYS),
    ("MSET", EVEN_KEYS),
    ("MSETNX", EVEN_KEYS),
    ("PSETEX", KEY),
    ("SET", KEY),
    ("SETEX", KEY),
    ("SETNX", KEY),
    ("SETRANGE", KEY),
    ("STRLEN", KEY),
    ("SUBSTR", KEY),
    ("DEL", ALL_KEYS),
];

const GENERIC_COMMANDS: &[(&str, IndexRewriter)] = &[
    ("EXISTS", ALL_KEYS),
    ("UNLINK", ALL_KEYS),
    ("TOUCH", ALL_KEYS),
    ("EXPIRE", KEY),
    ("PEXPIRE", KEY),
    ("EXPIREAT", KEY),
    ("PEXPIREAT", KEY),
    ("TTL", KEY),
    ("PTTL", KEY),
    ("PERSIST", KEY),
    ("TYPE", KEY),
    ("DUMP", KEY),
    ("RENAME", TWO_KEYS),
    ("RENAMENX", TWO_KEYS),
    ("COPY", TWO_KEYS),
    ("PING", NO_KEYS),
    ("ECHO", NO_KEYS),
];

const HASH_COMMANDS: &[(&str, IndexRewriter)] = &[
    ("HSET", KEY),
    ("HGET", KEY),
    ("HGETALL", KEY),
    ("HDEL", KEY),
    ("HEXISTS", KEY),
    ("HINCRBY", KEY),
    ("HINCRBYFLOAT", KEY),
    ("HKEYS", KEY),
    ("HVALS", KEY),
    ("HLEN", KEY),
    ("HMGET", KEY),
    ("HMSET", KEY),
    ("HSETNX", KEY),
    ("HSTRLEN", KEY),
    ("HSCAN", KEY),
    ("HRANDFIELD", KEY),
];

const LIST_COMMANDS: &[(&str, IndexRewriter)] = &[
    ("LPUSH", KEY),
    ("RPUSH", KEY),
    ("LPOP", KEY),
    ("RPOP", KEY),
    ("LLEN", KEY),
    ("LRANGE", KEY),
    ("LINDEX", KEY),
    ("LSET", KEY),
    ("LREM", KEY),
    ("LTRIM", KEY),
    ("LINSERT", KEY),
    ("LPOS", KEY),
    ("LPUSHX", KEY),
    ("RPUSHX", KEY),
    ("LMOVE", TWO_KEYS),
    ("RPOPLPUSH", TWO_KEYS),
];

const SORTED_SET_COMMANDS: &[(&str, IndexRewriter)] = &[
    ("ZADD", KEY),
    ("ZCOUNT", KEY),
    ("ZRANGE", KEY),
    ("ZREM", KEY),
    ("ZCARD", KEY),
    ("ZSCORE", KEY),
    ("ZSCAN", KEY),
    ("ZRANK", KEY),
    ("ZREVRANK", KEY),
    ("ZREMRANGEBYSCORE", KEY),
    ("ZREMRANGEBYRANK", KEY),
    ("ZREMRANGEBYLEX", KEY),
    ("ZRANDMEMBER", KEY),
    ("ZPOPMIN", KEY),
    ("ZPOPMAX", KEY),
    ("ZINCRBY", KEY),
    ("ZLEXCOUNT", KEY),
    ("ZREVRANGE", KEY),
    // numkeys sits in front of the keys
    ("ZDIFF", IndexRewriter::matching(|idx, _| idx > 0)),
    ("ZDIFFSTORE", IndexRewriter::matching(|idx, _| idx == 0 || idx > 1)),
    ("ZRANGESTORE", IndexRewriter::matching(|idx, _| idx < 2)),
    ("ZMSCORE", KEY),
];

/// The default executor table, built once.
static DEFAULT_EXECUTORS: LazyLock<Arc<ExecutorTable>> = LazyLock::new(|| {
    let mut table = ExecutorTable::new();

    for group in [
        STRING_COMMANDS,
        GENERIC_COMMANDS,
        LIST_COMMANDS,
        HASH_COMMANDS,
        SORTED_SET_COMMANDS,
    ] {
        for (cmd, rewriter) in group {
            table.insert(cmd.to_string(), Arc::new(*rewriter));
        }
    }

    table.insert("FLUSHDB".to_string(), Arc::new(FlushExecutor));
    table.insert("KEYS".to_string(), Arc::new(KeysExecutor));

    Arc::new(table)
});

/// Shared handle to the default table.
pub fn default_executors() -> Arc<ExecutorTable> {
    Arc::clone(&DEFAULT_EXECUTORS)
}
