//! RESP Network Transport
//!
//! Talks RESP to a store over TCP or a unix socket. Connections are pooled:
//!
//! ```text
//!   call ──> acquire permit (≤ max_open_conns, waits ≤ pool_timeout)
//!              │
//!              ▼
//!        reuse idle connection ── stale? drop it ──┐
//!              │ none left                         │
//!              ▼                                   │
//!        dial + handshake  <───────────────────────┘
//!              │
//!              ▼
//!        write request / read reply (write_timeout / read_timeout)
//!              │
//!              ▼
//!        healthy: back to the idle list (≤ max_idle_conns)
//!        failed or cancelled mid-flight: dropped
//! ```
//!
//! ## Handshake
//!
//! With protocol 3 the connection opens with `HELLO 3 [AUTH user pass]
//! [SETNAME name]`. Servers that reject `HELLO` get the RESP2 sequence
//! instead: `AUTH`, then `CLIENT SETNAME`. `SELECT db` follows when the
//! database is not 0.

use super::config::{Config, Network};
use super::Transport;
use crate::context::Context;
use crate::error::{Result, TransportError};
use crate::protocol::{parse_message, RespValue};
use crate::value::Value;
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Stream for S {}

type TransportResult<T> = std::result::Result<T, TransportError>;

/// One established connection.
struct Conn {
    stream: BufWriter<Box<dyn Stream>>,
    buffer: BytesMut,
    created_at: Instant,
    last_used: Instant,
}

impl Conn {
    async fn dial(config: &Config) -> TransportResult<Conn> {
        let connect = async {
            let stream: Box<dyn Stream> = match config.network {
                Network::Tcp => {
                    let stream = TcpStream::connect(&config.addr).await?;
                    stream.set_nodelay(true)?;
                    Box::new(stream)
                }
                #[cfg(unix)]
                Network::Unix => Box::new(tokio::net::UnixStream::connect(&config.addr).await?),
                #[cfg(not(unix))]
                Network::Unix => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "unix sockets are not supported on this platform",
                    ))
                }
            };
            Ok::<_, io::Error>(stream)
        };

        let stream = timeout(config.dial_timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout("dial"))??;

        let now = Instant::now();
        let mut conn = Conn {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            created_at: now,
            last_used: now,
        };
        conn.handshake(config).await?;

        debug!(addr = %config.addr, "Connection established");
        Ok(conn)
    }

    async fn handshake(&mut self, config: &Config) -> TransportResult<()> {
        let mut legacy = config.protocol < 3;

        if !legacy {
            let mut hello = vec![Bytes::from_static(b"HELLO"), Bytes::from_static(b"3")];
            if let Some(password) = &config.password {
                let username = config.username.as_deref().unwrap_or("default");
                hello.push(Bytes::from_static(b"AUTH"));
                hello.push(Bytes::copy_from_slice(username.as_bytes()));
                hello.push(Bytes::copy_from_slice(password.as_bytes()));
            }
            if let Some(name) = &config.client_name {
                hello.push(Bytes::from_static(b"SETNAME"));
                hello.push(Bytes::copy_from_slice(name.as_bytes()));
            }

            if let RespValue::Error(msg) = self.round_trip(hello, config).await? {
                debug!(error = %msg, "HELLO rejected, falling back to RESP2");
                legacy = true;
            }
        }

        if legacy {
            if let Some(password) = &config.password {
                let mut auth = vec![Bytes::from_static(b"AUTH")];
                if let Some(username) = &config.username {
                    auth.push(Bytes::copy_from_slice(username.as_bytes()));
                }
                auth.push(Bytes::copy_from_slice(password.as_bytes()));
                self.expect_ok(auth, config).await?;
            }
            if let Some(name) = &config.client_name {
                self.expect_ok(
                    vec![
                        Bytes::from_static(b"CLIENT"),
                        Bytes::from_static(b"SETNAME"),
                        Bytes::copy_from_slice(name.as_bytes()),
                    ],
                    config,
                )
                .await?;
            }
        }

        if config.db != 0 {
            self.expect_ok(
                vec![
                    Bytes::from_static(b"SELECT"),
                    Bytes::from(config.db.to_string()),
                ],
                config,
            )
            .await?;
        }

        Ok(())
    }

    async fn expect_ok(&mut self, parts: Vec<Bytes>, config: &Config) -> TransportResult<()> {
        match self.round_trip(parts, config).await? {
            RespValue::Error(msg) => Err(TransportError::Server(msg)),
            _ => Ok(()),
        }
    }

    /// Sends one command and reads its reply. Error replies are returned as
    /// values; only I/O and protocol failures are errors here.
    async fn round_trip(&mut self, parts: Vec<Bytes>, config: &Config) -> TransportResult<RespValue> {
        let request = RespValue::command(parts).serialize();

        timeout(config.write_timeout, async {
            self.stream.write_all(&request).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| TransportError::Timeout("write"))??;

        let reply = timeout(config.read_timeout, self.read_reply())
            .await
            .map_err(|_| TransportError::Timeout("read"))??;

        self.last_used = Instant::now();
        Ok(reply)
    }

    async fn read_reply(&mut self) -> TransportResult<RespValue> {
        loop {
            if !self.buffer.is_empty() {
                if let Some((reply, consumed)) = parse_message(&self.buffer)? {
                    self.buffer.advance(consumed);
                    return Ok(reply);
                }
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )
                .into());
            }
            trace!(bytes = n, "Read from connection");
        }
    }

    fn is_stale(&self, config: &Config) -> bool {
        let idle_expired = config
            .conn_max_idle_time
            .is_some_and(|max| self.last_used.elapsed() > max);
        let too_old = config
            .conn_max_lifetime
            .is_some_and(|max| self.created_at.elapsed() > max);
        idle_expired || too_old
    }
}

/// Pooled RESP transport.
pub struct RespTransport {
    config: Config,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Conn>>,
    closed: AtomicBool,
}

impl RespTransport {
    /// Creates the transport. No connection is made until the first call.
    pub fn new(config: Config) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_open_conns.max(1))),
            idle: Mutex::new(Vec::with_capacity(config.max_idle_conns)),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of idle connections currently pooled.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    fn checkout(&self) -> Option<Conn> {
        let mut idle = self.idle.lock();
        while let Some(conn) = idle.pop() {
            if !conn.is_stale(&self.config) {
                return Some(conn);
            }
            trace!("Dropping stale connection");
        }
        None
    }

    fn checkin(&self, conn: Conn) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_idle_conns {
            idle.push(conn);
        }
    }

    async fn exchange(&self, parts: Vec<Bytes>) -> TransportResult<RespValue> {
        let permit = timeout(
            self.config.pool_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| TransportError::PoolTimeout)?
        .map_err(|_| TransportError::Closed)?;

        let mut conn = match self.checkout() {
            Some(conn) => conn,
            None => Conn::dial(&self.config).await?,
        };

        let reply = conn.round_trip(parts, &self.config).await;
        match &reply {
            Ok(_) => self.checkin(conn),
            Err(e) => debug!(error = %e, "Dropping failed connection"),
        }

        drop(permit);
        reply
    }
}

#[async_trait]
impl Transport for RespTransport {
    async fn call(&self, ctx: &Context, parts: Vec<Bytes>) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed.into());
        }
        ctx.check()?;

        let reply = tokio::select! {
            reply = self.exchange(parts) => reply?,
            err = ctx.done() => return Err(err),
        };

        Ok(Value::try_from(reply)?)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.permits.close();
        self.idle.lock().clear();
        debug!(addr = %self.config.addr, "Transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Minimal RESP server: rejects HELLO when asked to, answers PING and
    /// ECHO, `OK` to everything else.
    struct FakeServer {
        addr: String,
        seen: Arc<Mutex<Vec<String>>>,
        accepted: Arc<AtomicUsize>,
    }

    impl FakeServer {
        async fn start(reject_hello: bool) -> FakeServer {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let accepted = Arc::new(AtomicUsize::new(0));

            let (seen_task, accepted_task) = (Arc::clone(&seen), Arc::clone(&accepted));
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    accepted_task.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(socket, Arc::clone(&seen_task), reject_hello));
                }
            });

            FakeServer {
                addr,
                seen,
                accepted,
            }
        }

        fn config(&self) -> Config {
            Config {
                addr: self.addr.clone(),
                ..Config::default()
            }
        }
    }

    async fn serve(mut socket: TcpStream, seen: Arc<Mutex<Vec<String>>>, reject_hello: bool) {
        let mut buf = BytesMut::new();
        loop {
            while let Ok(Some((RespValue::Array(parts), consumed))) = parse_message(&buf) {
                buf.advance(consumed);
                let words: Vec<String> = parts
                    .iter()
                    .map(|p| p.as_str().unwrap_or_default().to_string())
                    .collect();
                seen.lock().push(words.join(" "));

                let reply = match words[0].as_str() {
                    "HELLO" if reject_hello => RespValue::error("ERR unknown command 'HELLO'"),
                    "HELLO" => RespValue::Map(vec![(
                        RespValue::bulk_string(Bytes::from("proto")),
                        RespValue::integer(3),
                    )]),
                    "PING" => RespValue::simple_string("PONG"),
                    "ECHO" => RespValue::bulk_string(Bytes::from(words[1].clone())),
                    "GET" => RespValue::null(),
                    _ => RespValue::ok(),
                };
                if socket.write_all(&reply.serialize()).await.is_err() {
                    return;
                }
            }

            match socket.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn test_hello_handshake() {
        let server = FakeServer::start(false).await;
        let transport = RespTransport::new(Config {
            client_name: Some("svc".to_string()),
            ..server.config()
        });

        let reply = transport
            .call(&Context::background(), vec![Bytes::from("PING")])
            .await
            .unwrap();

        assert_eq!(reply, Value::Text("PONG".to_string()));
        assert_eq!(*server.seen.lock(), vec!["HELLO 3 SETNAME svc", "PING"]);
    }

    #[tokio::test]
    async fn test_resp2_fallback_handshake() {
        let server = FakeServer::start(true).await;
        let transport = RespTransport::new(Config {
            client_name: Some("svc".to_string()),
            password: Some("pw".to_string()),
            db: 2,
            ..server.config()
        });

        let reply = transport
            .call(
                &Context::background(),
                vec![Bytes::from("ECHO"), Bytes::from("hi")],
            )
            .await
            .unwrap();

        assert_eq!(reply, Value::Bytes(Bytes::from("hi")));
        assert_eq!(
            *server.seen.lock(),
            vec![
                "HELLO 3 AUTH default pw SETNAME svc",
                "AUTH pw",
                "CLIENT SETNAME svc",
                "SELECT 2",
                "ECHO hi",
            ]
        );
    }

    #[tokio::test]
    async fn test_connections_are_reused() {
        let server = FakeServer::start(false).await;
        let transport = RespTransport::new(server.config());
        let ctx = Context::background();

        for _ in 0..3 {
            transport.call(&ctx, vec![Bytes::from("PING")]).await.unwrap();
        }

        assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
        assert_eq!(transport.idle_connections(), 1);
    }

    #[tokio::test]
    async fn test_nil_reply_is_absent() {
        let server = FakeServer::start(false).await;
        let transport = RespTransport::new(server.config());

        let reply = transport
            .call(&Context::background(), vec![Bytes::from("GET"), Bytes::from("k")])
            .await
            .unwrap();
        assert!(reply.is_absent());
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let server = FakeServer::start(false).await;
        let transport = RespTransport::new(server.config());
        let ctx = Context::background();
        ctx.cancel();

        let err = transport.call(&ctx, vec![Bytes::from("PING")]).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(server.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let transport = RespTransport::new(Config::default());
        transport.close().await.unwrap();

        let err = transport
            .call(&Context::background(), vec![Bytes::from("PING")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_dial_failure_is_transport_error() {
        let transport = RespTransport::new(Config {
            addr: "127.0.0.1:1".to_string(),
            dial_timeout: Duration::from_millis(200),
            ..Config::default()
        });

        let err = transport
            .call(&Context::background(), vec![Bytes::from("PING")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
