//! Connection Configuration
//!
//! [`Config`] describes how the network transport reaches the store. It can be
//! built field by field or parsed from a connection URL:
//!
//! ```text
//! redis://[user:password@]host[:port][/db][?option=value...]
//! unix://[user:password@]/path/to/socket[?db=N&option=value...]
//! ```
//!
//! Supported options: `client_name`, `protocol`, `dial_timeout`,
//! `read_timeout`, `write_timeout`, `pool_timeout`, `conn_max_idle_time`,
//! `conn_max_lifetime`, `max_idle_conns`, `pool_size` and, for unix sockets,
//! `db`. Durations take unit suffixes (`500ms`, `3s`, `1m30s`) or a bare
//! number of seconds.

use crate::error::{Error, Result};
use std::time::Duration;
use url::Url;

/// Default store port.
pub const DEFAULT_PORT: u16 = 6379;

/// How to reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

/// Settings for the RESP transport and its connection pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub network: Network,
    /// `host:port` for TCP, socket path for unix
    pub addr: String,
    /// Logical database selected after connecting
    pub db: u32,
    pub client_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// RESP version announced with `HELLO` (2 or 3)
    pub protocol: u8,

    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// How long a caller waits for a free connection
    pub pool_timeout: Duration,

    /// Idle connections older than this are closed instead of reused
    pub conn_max_idle_time: Option<Duration>,
    /// Connections older than this are closed instead of reused
    pub conn_max_lifetime: Option<Duration>,

    pub max_idle_conns: usize,
    pub max_open_conns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            db: 0,
            client_name: None,
            username: None,
            password: None,
            protocol: 3,
            dial_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            pool_timeout: Duration::from_secs(4),
            conn_max_idle_time: Some(Duration::from_secs(30 * 60)),
            conn_max_lifetime: None,
            max_idle_conns: 4,
            max_open_conns: 10,
        }
    }
}

impl Config {
    /// Parses a `redis://` or `unix://` connection URL.
    pub fn parse_url(raw: &str) -> Result<Config> {
        let url = Url::parse(raw).map_err(|e| Error::Config(format!("{}: {}", raw, e)))?;
        let mut config = Config::default();

        match url.scheme() {
            "redis" => {
                let host = url.host_str().unwrap_or("127.0.0.1");
                let port = url.port().unwrap_or(DEFAULT_PORT);
                config.addr = format!("{}:{}", host, port);

                let db = url.path().trim_start_matches('/');
                if !db.is_empty() {
                    config.db = parse_number(db, "db")?;
                }
            }
            "unix" => {
                config.network = Network::Unix;
                config.addr = url.path().to_string();
                if config.addr.is_empty() {
                    return Err(Error::Config("unix socket path is empty".to_string()));
                }
            }
            other => {
                return Err(Error::Config(format!("unsupported scheme: {:?}", other)));
            }
        }

        if !url.username().is_empty() {
            config.username = Some(url.username().to_string());
        }
        config.password = url.password().map(str::to_string);

        for (key, value) in url.query_pairs() {
            config.apply_option(&key, &value)?;
        }

        Ok(config)
    }

    fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "db" if self.network == Network::Unix => self.db = parse_number(value, key)?,
            "client_name" => self.client_name = Some(value.to_string()),
            "protocol" => {
                self.protocol = parse_number(value, key)?;
                if !matches!(self.protocol, 2 | 3) {
                    return Err(Error::Config(format!("unsupported protocol: {}", value)));
                }
            }
            "dial_timeout" => self.dial_timeout = parse_duration(value)?,
            "read_timeout" => self.read_timeout = parse_duration(value)?,
            "write_timeout" => self.write_timeout = parse_duration(value)?,
            "pool_timeout" => self.pool_timeout = parse_duration(value)?,
            "conn_max_idle_time" => self.conn_max_idle_time = parse_optional_duration(value)?,
            "conn_max_lifetime" => self.conn_max_lifetime = parse_optional_duration(value)?,
            "max_idle_conns" => self.max_idle_conns = parse_number(value, key)?,
            "pool_size" => self.max_open_conns = parse_number(value, key)?,
            _ => return Err(Error::Config(format!("unexpected option: {}", key))),
        }
        Ok(())
    }

    /// Renders the connection URL for this configuration (the inverse of
    /// [`Config::parse_url`] for address, database and credentials).
    pub fn dsn(&self) -> Result<String> {
        let mut url = match self.network {
            Network::Tcp => Url::parse(&format!("redis://{}/{}", self.addr, self.db)),
            Network::Unix => Url::parse("unix://"),
        }
        .map_err(|e| Error::Config(format!("{}: {}", self.addr, e)))?;

        if self.network == Network::Unix {
            url.set_path(&self.addr);
            url.query_pairs_mut().append_pair("db", &self.db.to_string());
        }

        if self.username.is_some() || self.password.is_some() {
            let invalid = |_| Error::Config("credentials not supported for this address".to_string());
            url.set_username(self.username.as_deref().unwrap_or(""))
                .map_err(invalid)?;
            url.set_password(self.password.as_deref()).map_err(invalid)?;
        }

        Ok(url.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {}: {:?}", key, value)))
}

/// Parses a duration such as `250ms`, `3s` or `1m30s`, or a bare number of
/// seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = |reason: String| Error::Config(format!("invalid duration {:?}: {}", value, reason));

    if let Ok(seconds) = value.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds).map_err(|e| invalid(e.to_string()));
    }

    humantime::parse_duration(value).map_err(|e| invalid(e.to_string()))
}

/// Like [`parse_duration`]; `-1` and `0` disable the limit.
fn parse_optional_duration(value: &str) -> Result<Option<Duration>> {
    match value {
        "-1" | "0" => Ok(None),
        _ => parse_duration(value).map(Some),
    }
}
