mod common;

use common::TestCase;
use keyshape::decode::{Dest, ValueScanner};
use keyshape::{args, dests, ConversionError, Context, Db, Error, Value};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_scalars_from_store() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            db.execute(&ctx, "SET", args!["n", 42])
                .await
                .scan(dests![])
                .unwrap();

            let mut text = String::new();
            db.execute(&ctx, "GET", args!["n"])
                .await
                .scan(dests![text])
                .unwrap();

            let mut int = 0i32;
            db.execute(&ctx, "GET", args!["n"])
                .await
                .scan(dests![int])
                .unwrap();

            let mut float = 0f64;
            db.execute(&ctx, "GET", args!["n"])
                .await
                .scan(dests![float])
                .unwrap();

            let mut raw: Vec<u8> = Vec::new();
            db.execute(&ctx, "GET", args!["n"])
                .await
                .scan(dests![raw])
                .unwrap();

            assert_eq!(text, "42");
            assert_eq!(int, 42);
            assert_eq!(float, 42.0);
            assert_eq!(raw, b"42");

            let mut count = 0u64;
            db.execute(&ctx, "INCR", args!["n"])
                .await
                .scan(dests![count])
                .unwrap();
            assert_eq!(count, 43);
        })
        .await;
}

#[tokio::test]
async fn test_parse_failure_names_destination() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            db.execute(&ctx, "SET", args!["word", "hello"])
                .await
                .scan(dests![])
                .unwrap();

            let mut n = 0i64;
            let err = db
                .execute(&ctx, "GET", args!["word"])
                .await
                .scan(dests![n])
                .unwrap_err();

            match err {
                Error::Conversion(ConversionError::Parse { text, kind, .. }) => {
                    assert_eq!(text, "hello");
                    assert_eq!(kind, "i64");
                }
                other => panic!("unexpected error: {:?}", other),
            }
        })
        .await;
}

#[tokio::test]
async fn test_destination_count_must_match() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            db.execute(&ctx, "RPUSH", args!["l", "a", "b", "c"])
                .await
                .scan(dests![])
                .unwrap();

            let (mut a, mut b) = (String::new(), String::new());
            let err = db
                .execute(&ctx, "LRANGE", args!["l", 0, -1])
                .await
                .scan(dests![a, b])
                .unwrap_err();
            assert!(matches!(err, Error::MultiValue { destinations: 2, .. }));

            let mut c = String::new();
            db.execute(&ctx, "LRANGE", args!["l", 0, 2])
                .await
                .scan(dests![a, b, c])
                .unwrap();
            assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("a", "b", "c"));
        })
        .await;
}

#[tokio::test]
async fn test_zrange_with_scores_into_pairs() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            db.execute(&ctx, "ZADD", args!["board", 10, "ann", 7.5, "bob"])
                .await
                .scan(dests![])
                .unwrap();

            let mut scores: BTreeMap<String, f64> = BTreeMap::new();
            db.execute(&ctx, "ZRANGE", args!["board", 0, -1, "WITHSCORES"])
                .await
                .scan(dests![scores])
                .unwrap();

            assert_eq!(scores.get("bob"), Some(&7.5));
            assert_eq!(scores.get("ann"), Some(&10.0));
        })
        .await;
}

/// Collects the members of a reply as upper-case text.
#[derive(Default)]
struct Shouting(Vec<String>);

impl ValueScanner for Shouting {
    fn scan_value(&mut self, value: &Value) -> keyshape::Result<()> {
        let items = value.as_sequence().ok_or(ConversionError::UnsupportedShape {
            from: value.kind(),
            to: "Shouting",
        })?;
        self.0 = items.iter().map(|v| v.as_string().to_uppercase()).collect();
        Ok(())
    }
}

#[tokio::test]
async fn test_custom_and_dynamic_destinations() {
    TestCase::new()
        .run(|db| async move {
            let ctx = Context::background();
            db.execute(&ctx, "RPUSH", args!["l", "x", "y"])
                .await
                .scan(dests![])
                .unwrap();

            let mut shouting = Shouting::default();
            db.execute(&ctx, "LRANGE", args!["l", 0, -1])
                .await
                .scan(&mut [Dest::Custom(&mut shouting)])
                .unwrap();
            assert_eq!(shouting.0, vec!["X", "Y"]);

            let mut dynamic = Value::Absent;
            db.execute(&ctx, "LLEN", args!["l"])
                .await
                .scan(dests![dynamic])
                .unwrap();
            assert_eq!(dynamic, Value::Int(2));
        })
        .await;
}
