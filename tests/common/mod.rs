//! Shared harness for integration tests.
//!
//! [`TestCase::run`] executes a scenario against the in-memory store and,
//! when `REDIS_URL` is set, against that server too. Every DB starts from an
//! empty keyspace and logs its commands to the test output.

#![allow(dead_code)]

use keyshape::memory::MemoryTransport;
use keyshape::middleware::{CommandLogger, LoggerFactory};
use keyshape::open::{open, open_with, Options};
use keyshape::{args, dests, Arg, Context, Db, DbRef, Error};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Prints commands so `cargo test -- --nocapture` shows what ran.
struct PrintLogger {
    target: &'static str,
}

impl CommandLogger for PrintLogger {
    fn log(&self, cmd: &str, args: &[Arg], err: Option<&Error>, elapsed: Duration) {
        let mut line = format!("[{}][duration: {:?}]", self.target, elapsed);
        if let Some(err) = err {
            line.push_str(&format!("[error: {}]", err));
        }
        line.push(' ');
        line.push_str(cmd);
        for arg in args {
            line.push_str(&format!(" {}", arg));
        }
        println!("{}", line);
    }
}

fn logged(target: &'static str) -> Options {
    Options::new().with_middleware(LoggerFactory::new(Arc::new(PrintLogger { target })))
}

pub struct TestCase {
    redis_url: Option<String>,
}

impl Default for TestCase {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCase {
    pub fn new() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
        }
    }

    /// Runs `scenario` once per available store.
    pub async fn run<F, Fut>(&self, scenario: F)
    where
        F: Fn(DbRef) -> Fut,
        Fut: Future<Output = ()>,
    {
        let db = open_with(logged("memory"), MemoryTransport::new().into_backend())
            .expect("cannot build in-memory DB");
        run_on(db, &scenario).await;

        match &self.redis_url {
            Some(url) => {
                let db = open(logged("redis").with_url(url)).expect("cannot build redis DB");
                run_on(db, &scenario).await;
            }
            None => println!("No redis url given, skipping live server"),
        }
    }
}

async fn run_on<F, Fut>(db: DbRef, scenario: &F)
where
    F: Fn(DbRef) -> Fut,
    Fut: Future<Output = ()>,
{
    db.execute(&Context::background(), "FLUSHDB", args![])
        .await
        .scan(dests![])
        .expect("cannot flush store");

    scenario(Arc::clone(&db)).await;

    db.close().await.expect("cannot close DB");
}

/// `KEYS pattern`, sorted.
pub async fn keys(db: &dyn Db, pattern: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    db.execute(&Context::background(), "KEYS", args![pattern])
        .await
        .scan(dests![keys])
        .expect("KEYS failed");
    keys.sort();
    keys
}
