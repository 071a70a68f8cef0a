//! Error types for robo-console.

use std::net::SocketAddr;

use thiserror::Error;

use crate::server::ServerState;
use crate::session::SessionId;

/// Main error type for console server operations.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The listen address could not be bound.
    #[error("failed to bind console listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A session with the given ID is already registered.
    #[error("session already registered: {0}")]
    DuplicateSession(SessionId),

    /// Invalid server state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: ServerState, to: ServerState },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sessions were still open when the shutdown bound elapsed.
    #[error("shutdown timed out with {remaining} session(s) still open")]
    ShutdownTimeout { remaining: usize },

    /// The accept loop task failed.
    #[error("accept loop failed: {0}")]
    AcceptLoop(String),
}

/// Convenience Result type for console server operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;
