//! Error types shared by the servers and the orchestrator.

use crate::protocols::Protocol;
use thiserror::Error;

/// Result type for server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Server error types
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound
    #[error("Failed to bind {protocol} listener on '{addr}': {source}")]
    Bind {
        protocol: Protocol,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither server could be started
    #[error("No server could be started")]
    NoServers,

    /// An acceptance loop task panicked or was aborted
    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error outside of a single connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the error happened while starting a server
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Error::Bind { .. } | Error::NoServers)
    }
}
