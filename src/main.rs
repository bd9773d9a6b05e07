//! echo-server: a TCP echo server and an HTTP server in one process
//!
//! Two services share one shutdown coordinator:
//! - TCP echo: newline-delimited text with `quit` and `time` commands
//! - HTTP/1.1: fixed HTML pages at `/`, `/time`, `/hello` and `/echo`
//!
//! A demonstration client relays standard input to the echo server.
//! Configuration comes from CLI arguments or a TOML file.

mod app;
mod client;
mod config;
mod error;
mod protocols;
mod server;
mod session;
mod shutdown;

use config::Config;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How long the runtime waits for stray tasks, such as a blocked stdin
/// read, after the servers have stopped.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        tcp = %config.tcp.listen,
        http = %config.http.listen,
        max_connections = ?config.tcp.max_connections,
        workers = ?config.workers,
        client = ?config.client_mode,
        "Starting echo-server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    let result = runtime.block_on(app::run(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    if let Err(e) = &result {
        if e.is_startup_error() {
            error!(error = %e, "Failed to start servers");
        } else {
            error!(error = %e, "Server stopped with an error");
        }
    }
    result?;

    info!("Program finished");
    Ok(())
}
