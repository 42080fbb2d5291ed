mod common;

use async_trait::async_trait;
use common::{keys, TestCase};
use keyshape::db::ErrScanner;
use keyshape::memory::MemoryTransport;
use keyshape::middleware::prefix::FLUSH_BATCH_SIZE;
use keyshape::middleware::{prefix_of, PrefixFactory};
use keyshape::{
    args, dests, Arg, BoxScanner, Context, Db, DbRef, Error, MiddlewareFactory, TransportError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test]
async fn test_prefixed_keys_round_trip() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            let prefixed = PrefixFactory::new("foobar").wrap(Arc::clone(&db));

            prefixed
                .execute(&ctx, "SET", args!["buz", "biz"])
                .await
                .scan(dests![])
                .unwrap();

            let mut buz = String::new();
            prefixed
                .execute(&ctx, "GET", args!["buz"])
                .await
                .scan(dests![buz])
                .unwrap();
            assert_eq!(buz, "biz");

            let mut raw = String::new();
            let err = db
                .execute(&ctx, "GET", args!["buz"])
                .await
                .scan(dests![raw])
                .unwrap_err();
            assert!(err.is_empty());
            assert_eq!(raw, "");

            db.execute(&ctx, "GET", args!["foobar:buz"])
                .await
                .scan(dests![raw])
                .unwrap();
            assert_eq!(raw, "biz");

            db.execute(&ctx, "SET", args!["buz", "baz"])
                .await
                .scan(dests![])
                .unwrap();

            assert_eq!(keys(prefixed.as_ref(), "*").await, vec!["buz"]);
            assert_eq!(keys(db.as_ref(), "*").await, vec!["buz", "foobar:buz"]);

            prefixed
                .execute(&ctx, "FLUSHDB", args![])
                .await
                .scan(dests![])
                .unwrap();
            assert_eq!(keys(db.as_ref(), "*").await, vec!["buz"]);

            let nested = PrefixFactory::new("buz").wrap(Arc::clone(&prefixed));
            assert_eq!(prefix_of(db.as_ref()), "");
            assert_eq!(prefix_of(prefixed.as_ref()), "foobar:");
            assert_eq!(prefix_of(nested.as_ref()), "foobar:buz:");
        })
        .await;
}

#[tokio::test]
async fn test_flush_spans_several_batches() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            let prefixed = PrefixFactory::new("bulk").wrap(Arc::clone(&db));

            for i in 0..2000 {
                prefixed
                    .execute(&ctx, "SET", args![format!("k{}", i), i])
                    .await
                    .scan(dests![])
                    .unwrap();
            }
            for i in 0..5 {
                db.execute(&ctx, "SET", args![format!("outside{}", i), i])
                    .await
                    .scan(dests![])
                    .unwrap();
            }

            prefixed
                .execute(&ctx, "FLUSHDB", args![])
                .await
                .scan(dests![])
                .unwrap();

            assert!(keys(prefixed.as_ref(), "*").await.is_empty());
            assert_eq!(
                keys(db.as_ref(), "*").await,
                vec!["outside0", "outside1", "outside2", "outside3", "outside4"]
            );
        })
        .await;
}

/// Forwards to the store and records the size of every DEL. Can fail one
/// DEL, or cancel a context once a given DEL went through.
struct DelRecorder {
    next: DbRef,
    batches: Mutex<Vec<usize>>,
    fail_on: Option<usize>,
    cancel_after: Option<(usize, Context)>,
}

impl DelRecorder {
    fn new(next: DbRef) -> Self {
        Self {
            next,
            batches: Mutex::new(Vec::new()),
            fail_on: None,
            cancel_after: None,
        }
    }
}

#[async_trait]
impl Db for DelRecorder {
    async fn execute(&self, ctx: &Context, cmd: &str, args: Vec<Arg>) -> BoxScanner {
        if cmd != "DEL" {
            return self.next.execute(ctx, cmd, args).await;
        }

        let call = {
            let mut batches = self.batches.lock();
            batches.push(args.len());
            batches.len()
        };
        if self.fail_on == Some(call) {
            return Box::new(ErrScanner(Error::Transport(TransportError::Server(
                "ERR boom".to_string(),
            ))));
        }

        let scanner = self.next.execute(ctx, cmd, args).await;
        if let Some((after, cancel)) = &self.cancel_after {
            if *after == call {
                cancel.cancel();
            }
        }
        scanner
    }

    async fn close(&self) -> keyshape::Result<()> {
        self.next.close().await
    }

    fn inner(&self) -> Option<&DbRef> {
        Some(&self.next)
    }
}

async fn fill(db: &dyn Db, n: usize) {
    let ctx = Context::background();
    for i in 0..n {
        db.execute(&ctx, "SET", args![format!("k{}", i), i])
            .await
            .scan(dests![])
            .unwrap();
    }
}

#[tokio::test]
async fn test_flush_batches_stay_bounded() {
    let store: DbRef = Arc::new(MemoryTransport::new().into_backend());
    let recorder = Arc::new(DelRecorder::new(Arc::clone(&store)));
    let prefixed = PrefixFactory::new("bulk").wrap(recorder.clone());

    fill(prefixed.as_ref(), 3000).await;
    prefixed
        .execute(&Context::background(), "FLUSHDB", args![])
        .await
        .scan(dests![])
        .unwrap();

    assert_eq!(*recorder.batches.lock(), vec![FLUSH_BATCH_SIZE, FLUSH_BATCH_SIZE, 952]);
    assert!(keys(store.as_ref(), "*").await.is_empty());
}

#[tokio::test]
async fn test_flush_aborts_at_failed_batch() {
    let store: DbRef = Arc::new(MemoryTransport::new().into_backend());
    let recorder = Arc::new(DelRecorder {
        fail_on: Some(2),
        ..DelRecorder::new(Arc::clone(&store))
    });
    let prefixed = PrefixFactory::new("bulk").wrap(recorder.clone());

    fill(prefixed.as_ref(), 3000).await;
    let err = prefixed
        .execute(&Context::background(), "FLUSHDB", args![])
        .await
        .scan(dests![])
        .unwrap_err();

    assert!(matches!(&err, Error::Transport(TransportError::Server(msg)) if msg == "ERR boom"));
    assert_eq!(*recorder.batches.lock(), vec![FLUSH_BATCH_SIZE, FLUSH_BATCH_SIZE]);
    assert_eq!(keys(store.as_ref(), "bulk:*").await.len(), 3000 - FLUSH_BATCH_SIZE);
}

#[tokio::test]
async fn test_flush_stops_when_cancelled_between_batches() {
    let ctx = Context::background();
    let store: DbRef = Arc::new(MemoryTransport::new().into_backend());
    let recorder = Arc::new(DelRecorder {
        cancel_after: Some((1, ctx.clone())),
        ..DelRecorder::new(Arc::clone(&store))
    });
    let prefixed = PrefixFactory::new("bulk").wrap(recorder.clone());

    fill(prefixed.as_ref(), 3000).await;
    let err = prefixed
        .execute(&ctx, "FLUSHDB", args![])
        .await
        .scan(dests![])
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(*recorder.batches.lock(), vec![FLUSH_BATCH_SIZE]);
    assert_eq!(keys(store.as_ref(), "bulk:*").await.len(), 3000 - FLUSH_BATCH_SIZE);
}

#[tokio::test]
async fn test_nested_prefixes_store_joined_keys() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            let outer = PrefixFactory::new("a").wrap(Arc::clone(&db));
            let inner = PrefixFactory::new("b").wrap(outer);

            inner
                .execute(&ctx, "HSET", args!["user", "name", "alice", "age", 30])
                .await
                .scan(dests![])
                .unwrap();

            assert_eq!(keys(db.as_ref(), "*").await, vec!["a:b:user"]);

            let mut fields: HashMap<String, String> = HashMap::new();
            inner
                .execute(&ctx, "HGETALL", args!["user"])
                .await
                .scan(dests![fields])
                .unwrap();
            assert_eq!(fields.get("name").map(String::as_str), Some("alice"));
            assert_eq!(fields.get("age").map(String::as_str), Some("30"));
        })
        .await;
}

#[tokio::test]
async fn test_multi_key_commands_are_rewritten() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            let prefixed = PrefixFactory::new("ns").wrap(Arc::clone(&db));

            prefixed
                .execute(&ctx, "MSET", args!["a", 1, "b", 2])
                .await
                .scan(dests![])
                .unwrap();

            let (mut a, mut missing, mut b) = (0i64, None::<i64>, 0i64);
            prefixed
                .execute(&ctx, "MGET", args!["a", "zz", "b"])
                .await
                .scan(dests![a, missing, b])
                .unwrap();
            assert_eq!((a, missing, b), (1, None, 2));

            prefixed
                .execute(&ctx, "ZADD", args!["s1", 1, "x", 2, "y"])
                .await
                .scan(dests![])
                .unwrap();
            prefixed
                .execute(&ctx, "ZADD", args!["s2", 1, "y"])
                .await
                .scan(dests![])
                .unwrap();

            let mut stored = 0u32;
            prefixed
                .execute(&ctx, "ZDIFFSTORE", args!["out", 2, "s1", "s2"])
                .await
                .scan(dests![stored])
                .unwrap();
            assert_eq!(stored, 1);

            let mut members: Vec<String> = Vec::new();
            db.execute(&ctx, "ZRANGE", args!["ns:out", 0, -1])
                .await
                .scan(dests![members])
                .unwrap();
            assert_eq!(members, vec!["x"]);
        })
        .await;
}

#[tokio::test]
async fn test_unknown_command_is_refused() {
    TestCase::new()
        .run(|db| async move {
            let prefixed = PrefixFactory::new("ns").wrap(Arc::clone(&db));

            let err = prefixed
                .execute(&Context::background(), "SUBSCRIBE", args!["chan"])
                .await
                .scan(dests![])
                .unwrap_err();

            assert!(matches!(&err, Error::UnsupportedCommand(cmd) if cmd == "SUBSCRIBE"));
            assert_eq!(
                err.to_string(),
                "prefix wrapping for cmd \"SUBSCRIBE\" not implemented"
            );
        })
        .await;
}
