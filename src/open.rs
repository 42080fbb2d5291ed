//! Opening a Chain
//!
//! [`Options`] collects the connection configuration, the middlewares and the
//! namespace prefix; [`open`] assembles them into a ready [`DbRef`]:
//!
//! ```text
//!   caller ──> prefix ──> middleware N ──> ... ──> middleware 1 ──> Backend
//! ```
//!
//! Middlewares wrap in the order they were added, the prefix layer always
//! goes outermost.
//!
//! ```
//! use keyshape::middleware::LoggerFactory;
//! use keyshape::open::{open, Options};
//!
//! let db = open(
//!     Options::new()
//!         .with_url("redis://127.0.0.1:6379/0?prefix=sessions")
//!         .with_middleware(LoggerFactory::debug()),
//! )
//! .unwrap();
//!
//! assert_eq!(keyshape::middleware::prefix_of(db.as_ref()), "sessions:");
//! ```

use crate::backend::{Backend, Config, Transport};
use crate::db::{DbRef, MiddlewareFactory};
use crate::error::{Error, Result};
use crate::middleware::PrefixFactory;
use std::sync::Arc;
use url::Url;

/// Query parameter of a connection URL naming the namespace prefix.
const PREFIX_PARAM: &str = "prefix";

/// Settings for [`open`].
#[derive(Default)]
pub struct Options {
    config: Config,
    prefix: String,
    middlewares: Vec<Arc<dyn MiddlewareFactory>>,
    /// First failure met while building, reported by `open`
    err: Option<Error>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edits the connection configuration in place.
    pub fn with_config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// Replaces configuration and prefix with the ones carried by `url`.
    ///
    /// The `prefix` query parameter is removed before the rest of the URL is
    /// parsed as a [`Config`]. A malformed URL is reported by [`open`].
    pub fn with_url(mut self, raw: &str) -> Self {
        match split_prefix(raw).and_then(|(url, prefix)| Ok((Config::parse_url(&url)?, prefix))) {
            Ok((config, prefix)) => {
                self.config = config;
                self.prefix = prefix;
            }
            Err(e) => {
                self.err.get_or_insert(e);
            }
        }
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_middleware(mut self, factory: impl MiddlewareFactory + 'static) -> Self {
        self.middlewares.push(Arc::new(factory));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Strips the prefix parameter from `raw`, returning the remaining URL and
/// the prefix (empty when absent).
fn split_prefix(raw: &str) -> Result<(String, String)> {
    let mut url = Url::parse(raw).map_err(|e| Error::Config(format!("{}: {}", raw, e)))?;

    let mut prefix = String::new();
    let rest: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key == PREFIX_PARAM {
                prefix = value.into_owned();
                None
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect();

    if rest.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(rest);
    }

    Ok((url.to_string(), prefix))
}

/// Opens a chain over the network transport described by `options`.
pub fn open(options: Options) -> Result<DbRef> {
    let config = options.config.clone();
    open_with(options, Backend::from_config(config))
}

/// Opens a chain over an already built backend (the in-memory store, a test
/// double). The configuration held by `options` is ignored.
pub fn open_with<T>(options: Options, backend: Backend<T>) -> Result<DbRef>
where
    T: Transport + 'static,
{
    if let Some(err) = options.err {
        return Err(err);
    }

    let mut db: DbRef = Arc::new(backend);
    for middleware in &options.middlewares {
        db = middleware.wrap(db);
    }

    if !options.prefix.is_empty() {
        db = PrefixFactory::new(options.prefix).wrap(db);
    }

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Network;
    use crate::context::Context;
    use crate::db::{layers, Db};
    use crate::memory::MemoryTransport;
    use crate::middleware::{prefix_of, LoggerFactory};
    use crate::{args, dests};
    use std::time::Duration;

    #[test]
    fn test_url_prefix_is_extracted() {
        let options = Options::new().with_url("redis://cache:6380/3?prefix=app&dial_timeout=1s");

        assert_eq!(options.prefix(), "app");
        assert_eq!(options.config().addr, "cache:6380");
        assert_eq!(options.config().db, 3);
        assert_eq!(options.config().dial_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_split_prefix() {
        let (url, prefix) = split_prefix("redis://localhost/0?prefix=a").unwrap();
        assert_eq!(url, "redis://localhost/0");
        assert_eq!(prefix, "a");

        let (url, prefix) = split_prefix("unix:///tmp/s.sock?db=2").unwrap();
        assert_eq!(url, "unix:///tmp/s.sock?db=2");
        assert_eq!(prefix, "");
    }

    #[test]
    fn test_bad_url_fails_on_open() {
        let options = Options::new().with_url("not a url");
        assert!(matches!(open(options), Err(Error::Config(_))));

        let options = Options::new().with_url("redis://localhost?bogus=1");
        assert!(open(options).is_err());
    }

    #[test]
    fn test_with_config() {
        let options = Options::new().with_config(|c| {
            c.network = Network::Unix;
            c.addr = "/tmp/store.sock".to_string();
        });
        assert_eq!(options.config().network, Network::Unix);
        assert_eq!(options.prefix(), "");
    }

    #[test]
    fn test_prefix_goes_outermost() {
        let db = open_with(
            Options::new()
                .with_prefix("svc")
                .with_middleware(LoggerFactory::debug()),
            MemoryTransport::new().into_backend(),
        )
        .unwrap();

        assert_eq!(db.prefix_segment(), Some("svc:"));
        assert_eq!(layers(db.as_ref()).count(), 3);
        assert_eq!(prefix_of(db.as_ref()), "svc:");
    }

    #[test]
    fn test_no_prefix_no_layer() {
        let db = open_with(Options::new(), MemoryTransport::new().into_backend()).unwrap();
        assert_eq!(layers(db.as_ref()).count(), 1);
    }

    #[tokio::test]
    async fn test_open_with_memory_transport() {
        let transport = MemoryTransport::new();
        let db = open_with(
            Options::new().with_prefix("tenant"),
            transport.clone().into_backend(),
        )
        .unwrap();

        db.execute(&Context::background(), "SET", args!["k", "v"])
            .await
            .scan(dests![])
            .unwrap();

        assert!(transport.store().exists(b"tenant:k"));
    }
}
