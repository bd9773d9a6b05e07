//! Process-wide shutdown coordination.
//!
//! One [`Shutdown`] is created by the orchestrator and handed to every
//! server when it is bound. Each server derives a child token from it, so
//! triggering the coordinator cancels every acceptance loop at once while a
//! single server can still be stopped on its own.
//!
//! Cancellation is cooperative: acceptance loops select on their token and
//! drop the listener when it fires, which is what releases the port and
//! makes new connection attempts fail. Open echo sessions are left alone
//! and end at their next liveness check.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared shutdown signal.
#[derive(Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: AtomicBool,
}

impl Shutdown {
    /// Create a coordinator in the "running" state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown of every server derived from this coordinator.
    ///
    /// Returns `true` for the call that initiated shutdown and `false` for
    /// every later call, which has no effect.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(reason, "Shutdown requested");
        self.token.cancel();
        true
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is requested
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Token for one server. Cancelled with the coordinator, but cancelling
    /// it does not affect other servers.
    pub fn server_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Trigger `shutdown` on Ctrl-C (and SIGTERM on unix).
pub async fn trigger_on_signal(shutdown: &Shutdown) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { shutdown.trigger("interrupt"); }
        _ = terminate => { shutdown.trigger("terminate"); }
        _ = shutdown.triggered() => {}
    }
}
