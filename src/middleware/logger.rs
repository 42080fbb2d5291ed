//! Command Logging Middleware
//!
//! Every command going through the layer is reported to a [`CommandLogger`]
//! once its scanner has been scanned, with the time elapsed since `execute`
//! was called. Commands whose scanner is dropped unscanned are not logged.

use crate::args::Arg;
use crate::context::Context;
use crate::db::{BoxScanner, Db, DbRef, MiddlewareFactory, Scanner};
use crate::decode::Dest;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;

/// Receives one record per scanned command.
pub trait CommandLogger: Send + Sync {
    fn log(&self, cmd: &str, args: &[Arg], err: Option<&Error>, elapsed: Duration);
}

/// Logs commands as `tracing` events at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: Level,
}

impl TracingLogger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

/// Renders `CMD arg1 arg2 ...`.
fn command_line(cmd: &str, args: &[Arg]) -> String {
    let mut line = cmd.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string());
    }
    line
}

macro_rules! event_at {
    ($level:expr, $($rest:tt)+) => {
        if $level == Level::ERROR {
            tracing::error!($($rest)+)
        } else if $level == Level::WARN {
            tracing::warn!($($rest)+)
        } else if $level == Level::INFO {
            tracing::info!($($rest)+)
        } else if $level == Level::DEBUG {
            tracing::debug!($($rest)+)
        } else {
            tracing::trace!($($rest)+)
        }
    };
}

impl CommandLogger for TracingLogger {
    fn log(&self, cmd: &str, args: &[Arg], err: Option<&Error>, elapsed: Duration) {
        let line = command_line(cmd, args);
        let error = err.map(tracing::field::display);
        event_at!(self.level, duration = ?elapsed, error, "{}", line);
    }
}

/// Factory for the logging layer.
#[derive(Clone)]
pub struct LoggerFactory {
    logger: Arc<dyn CommandLogger>,
}

impl LoggerFactory {
    pub fn new(logger: Arc<dyn CommandLogger>) -> Self {
        Self { logger }
    }

    /// Logs through `tracing` at `level`.
    pub fn with_level(level: Level) -> Self {
        Self::new(Arc::new(TracingLogger::new(level)))
    }

    pub fn debug() -> Self {
        Self::with_level(Level::DEBUG)
    }
}

impl MiddlewareFactory for LoggerFactory {
    fn wrap(&self, next: DbRef) -> DbRef {
        Arc::new(LoggerDb {
            next,
            logger: Arc::clone(&self.logger),
        })
    }
}

struct LoggerDb {
    next: DbRef,
    logger: Arc<dyn CommandLogger>,
}

#[async_trait]
impl Db for LoggerDb {
    async fn execute(&self, ctx: &Context, cmd: &str, args: Vec<Arg>) -> BoxScanner {
        let started = Instant::now();
        let inner = self.next.execute(ctx, cmd, args.clone()).await;

        Box::new(LoggingScanner {
            inner,
            logger: Arc::clone(&self.logger),
            cmd: cmd.to_string(),
            args,
            started,
        })
    }

    async fn close(&self) -> Result<()> {
        self.next.close().await
    }

    fn inner(&self) -> Option<&DbRef> {
        Some(&self.next)
    }
}

struct LoggingScanner {
    inner: BoxScanner,
    logger: Arc<dyn CommandLogger>,
    cmd: String,
    args: Vec<Arg>,
    started: Instant,
}

impl Scanner for LoggingScanner {
    fn scan(self: Box<Self>, dests: &mut [Dest<'_>]) -> Result<()> {
        let LoggingScanner {
            inner,
            logger,
            cmd,
            args,
            started,
        } = *self;

        let result = inner.scan(dests);
        logger.log(&cmd, &args, result.as_ref().err(), started.elapsed());
        result
    }
}
