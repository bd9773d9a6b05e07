//! Session state machine for accepted echo connections.
//!
//! Each session tracks whether it is still active and, once closed, why.
//! The server's running flag is shared with every session so a stopped
//! server ends its sessions at their next liveness check.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `quit`.
    Quit,
    /// Client closed its end of the connection.
    PeerClosed,
    /// The server stopped while the session was open.
    ServerStopped,
    /// No complete line arrived within the idle timeout.
    IdleTimeout,
    /// A line exceeded the maximum length.
    LineTooLong,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Quit => "quit",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::ServerStopped => "server stopped",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::LineTooLong => "line too long",
        };
        f.write_str(reason)
    }
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading lines and answering them.
    Active,
    /// Terminal state; the connection is dropped.
    Closed(CloseReason),
}

/// A single client session.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
    /// Running flag of the owning server.
    running: Arc<AtomicBool>,
}

impl Session {
    /// Create a new session in the active state.
    pub fn new(peer: SocketAddr, running: Arc<AtomicBool>) -> Self {
        Self {
            peer,
            state: SessionState::Active,
            running,
        }
    }

    /// Remote endpoint of the connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Check liveness, closing the session if the server has stopped.
    pub fn is_active(&mut self) -> bool {
        if self.state == SessionState::Active && !self.running.load(Ordering::Acquire) {
            self.state = SessionState::Closed(CloseReason::ServerStopped);
        }
        self.state == SessionState::Active
    }

    /// Close the session. The first reason wins.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Active {
            self.state = SessionState::Closed(reason);
        }
    }

    /// Reason the session closed, if it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            SessionState::Active => None,
            SessionState::Closed(reason) => Some(reason),
        }
    }
}
