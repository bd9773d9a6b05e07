//! TCP servers for the echo and HTTP protocols.
//!
//! Both protocols share one acceptance loop: accept connections until the
//! server's token is cancelled, hand each connection to a tracked task
//! running the protocol handler, then drop the listener so the port is
//! released.

use crate::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::protocols::{echo, http, Protocol};
use crate::session::Session;
use crate::shutdown::Shutdown;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Pause after a failed accept so a persistent error such as running out
/// of file descriptors does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Outcome of waiting for the next connection
#[derive(Debug)]
pub enum Accept {
    /// A client connected
    Accepted(TcpStream, SocketAddr),
    /// The server is shutting down; the listener is about to be dropped
    ListenerClosed,
    /// Accepting failed but the listener is still usable
    TransientError(io::Error),
}

/// A bound server that has not started accepting yet
pub struct Server {
    protocol: Protocol,
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ListenerConfig,
    running: Arc<AtomicBool>,
    token: CancellationToken,
    connection_limit: Option<Arc<Semaphore>>,
    sessions: TaskTracker,
}

impl Server {
    /// Bind the listener for `protocol`. The server stops when `shutdown`
    /// is triggered.
    pub async fn bind(
        protocol: Protocol,
        config: ListenerConfig,
        shutdown: &Shutdown,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .map_err(|source| Error::Bind {
                protocol,
                addr: config.listen.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            %protocol,
            address = %local_addr,
            max_connections = ?config.max_connections,
            "Server listening"
        );

        Ok(Server {
            protocol,
            listener,
            local_addr,
            connection_limit: config
                .max_connections
                .map(|limit| Arc::new(Semaphore::new(limit))),
            config,
            running: Arc::new(AtomicBool::new(false)),
            token: shutdown.server_token(),
            sessions: TaskTracker::new(),
        })
    }

    /// Start the acceptance loop on the current runtime
    pub fn start(self) -> RunningServer {
        self.running.store(true, Ordering::Release);

        let handle = ServerHandle {
            protocol: self.protocol,
            local_addr: self.local_addr,
            running: Arc::clone(&self.running),
            token: self.token.clone(),
            sessions: self.sessions.clone(),
        };
        let task = tokio::spawn(self.run());

        handle.with_task(task)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.token.is_cancelled()
    }

    /// Wait for the next connection or for shutdown, whichever comes first
    async fn accept(&self) -> Accept {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Accept::ListenerClosed,
            result = self.listener.accept() => match result {
                Ok((stream, peer)) => Accept::Accepted(stream, peer),
                Err(e) => Accept::TransientError(e),
            },
        }
    }

    /// Wait out [`ACCEPT_ERROR_BACKOFF`]. Returns `false` if the server was
    /// stopped meanwhile.
    async fn backoff(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        }
    }

    async fn run(self) {
        while self.is_running() {
            // Wait for a connection slot when a limit is configured
            let permit = match &self.connection_limit {
                Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        debug!(protocol = %self.protocol, "Connection limit reached, waiting");
                        tokio::select! {
                            biased;
                            _ = self.token.cancelled() => break,
                            permit = Arc::clone(limit).acquire_owned() => match permit {
                                Ok(permit) => Some(permit),
                                Err(_) => break,
                            },
                        }
                    }
                },
                None => None,
            };

            match self.accept().await {
                Accept::Accepted(stream, peer) => self.dispatch(stream, peer, permit),
                Accept::ListenerClosed => break,
                Accept::TransientError(e) => {
                    warn!(protocol = %self.protocol, error = %e, "Failed to accept connection");
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::Release);
        let Server {
            protocol,
            listener,
            local_addr,
            ..
        } = self;
        drop(listener);
        info!(%protocol, address = %local_addr, "Server stopped accepting connections");
    }

    /// Spawn the protocol handler for an accepted connection
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, permit: Option<OwnedSemaphorePermit>) {
        debug!(protocol = %self.protocol, peer = %peer, "New connection");
        let idle_timeout = self.config.idle_timeout;

        match self.protocol {
            Protocol::Echo => {
                let session = Session::new(peer, Arc::clone(&self.running));
                self.sessions.spawn(async move {
                    if let Err(e) = echo::handle_connection(stream, session, idle_timeout).await {
                        warn!(peer = %peer, error = %e, "Echo session failed");
                    }
                    drop(permit);
                });
            }
            Protocol::Http => {
                let token = self.token.clone();
                self.sessions.spawn(async move {
                    if let Err(e) = http::handle_connection(stream, peer, token, idle_timeout).await {
                        if e.is_incomplete_message() {
                            debug!(peer = %peer, error = %e, "HTTP client went away");
                        } else {
                            warn!(peer = %peer, error = %e, "HTTP connection failed");
                        }
                    }
                    drop(permit);
                });
            }
        }
    }
}

/// Handle to a running server
pub struct ServerHandle {
    protocol: Protocol,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    token: CancellationToken,
    sessions: TaskTracker,
}

/// A [`ServerHandle`] together with its acceptance loop task
pub struct RunningServer {
    handle: ServerHandle,
    task: JoinHandle<()>,
}

impl ServerHandle {
    fn with_task(self, task: JoinHandle<()>) -> RunningServer {
        RunningServer { handle: self, task }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the acceptance loop is still accepting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.token.is_cancelled()
    }

    /// Connections whose handler task has not finished yet
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Stop this server only. Open sessions are not interrupted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.token.cancel();
    }
}

impl std::ops::Deref for RunningServer {
    type Target = ServerHandle;

    fn deref(&self) -> &ServerHandle {
        &self.handle
    }
}

impl RunningServer {
    /// Wait for the acceptance loop to exit, then give open sessions up to
    /// `drain_timeout` to finish. Sessions still open afterwards keep
    /// running in the background.
    pub async fn join(self, drain_timeout: Option<Duration>) -> Result<()> {
        let RunningServer { handle, task } = self;
        task.await?;

        handle.sessions.close();
        if let Some(grace) = drain_timeout {
            if tokio::time::timeout(grace, handle.sessions.wait()).await.is_err() {
                warn!(
                    protocol = %handle.protocol,
                    remaining = handle.sessions.len(),
                    "Sessions still open after drain timeout"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    const GRACE: Duration = Duration::from_secs(2);

    async fn start(protocol: Protocol, config: ListenerConfig) -> (Arc<Shutdown>, RunningServer) {
        let shutdown = Arc::new(Shutdown::new());
        let server = Server::bind(protocol, config, &shutdown).await.unwrap();
        (shutdown, server.start())
    }

    struct EchoClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl EchoClient {
        async fn connect(addr: SocketAddr) -> Self {
            let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: BufReader::new(reader),
                writer,
            }
        }

        async fn send(&mut self, line: &str) -> String {
            self.writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
            let mut reply = String::new();
            self.reader.read_line(&mut reply).await.unwrap();
            reply
        }
    }

    #[tokio::test]
    async fn test_bind_failure_reports_address() {
        let (_shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        let taken = server.local_addr().to_string();

        let shutdown = Shutdown::new();
        let err = Server::bind(Protocol::Echo, ListenerConfig::new(taken.clone()), &shutdown)
            .await
            .err()
            .expect("second bind should fail");
        match err {
            Error::Bind { protocol, addr, .. } => {
                assert_eq!(protocol, Protocol::Echo);
                assert_eq!(addr, taken);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_accept_error_backoff() {
        let shutdown = Shutdown::new();
        let server = Server::bind(Protocol::Echo, ListenerConfig::new("127.0.0.1:0"), &shutdown)
            .await
            .unwrap();

        let started = std::time::Instant::now();
        assert!(server.backoff().await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);

        shutdown.trigger("test");
        let started = std::time::Instant::now();
        assert!(!server.backoff().await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_echo_session_over_tcp() {
        let (_shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        assert!(server.is_running());

        let mut client = EchoClient::connect(server.local_addr()).await;
        assert_eq!(client.send("hello").await, "Эхо: hello\n");
        assert!(client.send("TIME").await.starts_with("Текущее время: "));
        assert_eq!(client.send("quit").await, "До свидания!\n");

        let mut rest = Vec::new();
        client.reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_clients_are_isolated() {
        let (_shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        let addr = server.local_addr();

        let clients: Vec<_> = (0..8)
            .map(|id| {
                tokio::spawn(async move {
                    let mut client = EchoClient::connect(addr).await;
                    for round in 0..5 {
                        let payload = format!("client-{id}-round-{round}");
                        assert_eq!(client.send(&payload).await, format!("Эхо: {payload}\n"));
                    }
                    client.send("quit").await
                })
            })
            .collect();

        for client in clients {
            assert_eq!(client.await.unwrap(), "До свидания!\n");
        }
    }

    #[tokio::test]
    async fn test_stop_releases_listener() {
        let (shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        let addr = server.local_addr();

        server.stop();
        assert!(!server.is_running());
        assert!(!shutdown.is_triggered());

        tokio::time::timeout(GRACE, server.join(None))
            .await
            .expect("acceptance loop should exit")
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_open_session_survives_listener_close() {
        let (shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        let mut client = EchoClient::connect(server.local_addr()).await;
        assert_eq!(client.send("before").await, "Эхо: before\n");

        shutdown.trigger("test");
        tokio::time::timeout(GRACE, server.join(None))
            .await
            .expect("acceptance loop should exit")
            .unwrap();

        // The session was parked in a read; it answers once more, then
        // notices the stopped server and closes.
        assert_eq!(client.send("after").await, "Эхо: after\n");
        let mut rest = Vec::new();
        client.reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_connection_limit_queues_clients() {
        let mut config = ListenerConfig::new("127.0.0.1:0");
        config.max_connections = Some(1);
        let (_shutdown, server) = start(Protocol::Echo, config).await;
        let addr = server.local_addr();

        let mut first = EchoClient::connect(addr).await;
        assert_eq!(first.send("first").await, "Эхо: first\n");

        // The kernel completes the handshake but the server does not accept
        // until the first session releases its slot.
        let mut second = EchoClient::connect(addr).await;
        second.writer.write_all(b"second\n").await.unwrap();
        let mut reply = String::new();
        let waited = tokio::time::timeout(
            Duration::from_millis(200),
            second.reader.read_line(&mut reply),
        )
        .await;
        assert!(waited.is_err(), "second client was served early: {reply:?}");

        assert_eq!(first.send("quit").await, "До свидания!\n");

        let mut reply = String::new();
        tokio::time::timeout(GRACE, second.reader.read_line(&mut reply))
            .await
            .expect("second client should be served")
            .unwrap();
        assert_eq!(reply, "Эхо: second\n");
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_for_slot() {
        let mut config = ListenerConfig::new("127.0.0.1:0");
        config.max_connections = Some(1);
        let (shutdown, server) = start(Protocol::Echo, config).await;

        let mut client = EchoClient::connect(server.local_addr()).await;
        assert_eq!(client.send("hold").await, "Эхо: hold\n");
        assert_eq!(server.active_sessions(), 1);

        shutdown.trigger("test");
        tokio::time::timeout(GRACE, server.join(None))
            .await
            .expect("slot wait should be cancelled")
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_timeout_bounds_join() {
        let (shutdown, server) = start(Protocol::Echo, ListenerConfig::new("127.0.0.1:0")).await;
        let mut client = EchoClient::connect(server.local_addr()).await;
        assert_eq!(client.send("idle").await, "Эхо: idle\n");

        shutdown.trigger("test");
        tokio::time::timeout(GRACE, server.join(Some(Duration::from_millis(100))))
            .await
            .expect("join should give up on the idle session")
            .unwrap();
    }

    #[tokio::test]
    async fn test_http_not_found_over_tcp() {
        let (_shutdown, server) = start(Protocol::Http, ListenerConfig::new("127.0.0.1:0")).await;

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 404 Not Found\r\n"), "got {raw}");
        assert!(raw.contains("404 - Страница не найдена"));
    }
}
