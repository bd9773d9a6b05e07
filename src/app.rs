//! Process orchestration.
//!
//! Binds the echo and HTTP servers against one shared [`Shutdown`], runs
//! the demonstration client, and waits for both acceptance loops once
//! shutdown is triggered.

use crate::client;
use crate::config::{ClientMode, Config, ListenerConfig};
use crate::error::{Error, Result};
use crate::protocols::Protocol;
use crate::server::{RunningServer, Server};
use crate::shutdown::{self, Shutdown};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Both servers and the coordinator that stops them
pub struct App {
    shutdown: Arc<Shutdown>,
    servers: Vec<RunningServer>,
    drain_timeout: Option<Duration>,
}

impl App {
    /// Bind and start both servers. A server that fails to bind is logged
    /// and skipped; it is an error only if neither starts.
    pub async fn start(config: &Config) -> Result<Self> {
        let shutdown = Arc::new(Shutdown::new());
        let listeners: [(Protocol, &ListenerConfig); 2] =
            [(Protocol::Echo, &config.tcp), (Protocol::Http, &config.http)];

        let mut servers = Vec::with_capacity(listeners.len());
        for (protocol, listener) in listeners {
            match Server::bind(protocol, listener.clone(), &shutdown).await {
                Ok(server) => servers.push(server.start()),
                Err(e) => error!(error = %e, "Server failed to start"),
            }
        }

        if servers.is_empty() {
            return Err(Error::NoServers);
        }

        Ok(App {
            shutdown,
            servers,
            drain_timeout: config.drain_timeout,
        })
    }

    pub fn shutdown(&self) -> Arc<Shutdown> {
        Arc::clone(&self.shutdown)
    }

    /// The running server for `protocol`, if it started
    pub fn server(&self, protocol: Protocol) -> Option<&RunningServer> {
        self.servers
            .iter()
            .find(|server| server.protocol() == protocol)
    }

    /// Trigger shutdown and mark every server stopped. Safe to call more
    /// than once.
    pub fn stop(&self, reason: &str) {
        self.shutdown.trigger(reason);
        for server in &self.servers {
            if server.is_running() {
                info!(protocol = %server.protocol(), "Stopping server");
            }
            server.stop();
        }
    }

    /// Wait for every acceptance loop to exit. Call after [`App::stop`] or
    /// once the shutdown signal has fired.
    pub async fn wait(self) -> Result<()> {
        for server in self.servers {
            info!(
                protocol = %server.protocol(),
                sessions = server.active_sessions(),
                "Waiting for server to stop"
            );
            server.join(self.drain_timeout).await?;
        }
        info!("All servers stopped");
        Ok(())
    }
}

/// Run both servers until interrupted, or until the inline demonstration
/// client finishes.
pub async fn run(config: Config) -> Result<()> {
    let app = App::start(&config).await?;
    serve(app, config.client_mode, config.client_delay).await
}

/// Drive a started [`App`] until shutdown and wait for it to stop.
async fn serve(app: App, client_mode: ClientMode, client_delay: Duration) -> Result<()> {
    let shutdown = app.shutdown();

    let signals = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move { shutdown::trigger_on_signal(&shutdown).await })
    };

    let echo_addr = app.server(Protocol::Echo).map(|server| server.local_addr());
    match (client_mode, echo_addr) {
        (ClientMode::Inline, Some(addr)) => {
            tokio::select! {
                _ = client::run_demo(addr, client_delay) => {}
                _ = shutdown.triggered() => {}
            }
        }
        (ClientMode::Background, Some(addr)) => {
            tokio::spawn(client::run_demo(addr, client_delay));
            info!("Waiting for requests; press Ctrl-C to stop");
            shutdown.triggered().await;
        }
        _ => {
            info!("Waiting for requests; press Ctrl-C to stop");
            shutdown.triggered().await;
        }
    }

    if !shutdown.is_triggered() {
        info!("Demonstration client finished");
    }
    app.stop("demonstration finished");
    let result = app.wait().await;
    signals.abort();
    result
}
