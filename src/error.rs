//! Error types
//!
//! One enum per layer: transport collaborators, the connection pool,
//! the pacer, the result sink, and the run as a whole.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {0} failed: {1}")]
    ConnectFailed(String, String),

    #[error("Connection is not open")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Errors raised while opening a level's connections
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to start connection {id}: {source}")]
    Connect {
        id: usize,
        #[source]
        source: TransportError,
    },

    #[error("Connection {id} failed during open: {reason}")]
    OpenFailed { id: usize, reason: String },

    #[error("Only {opened}/{expected} connections opened within {timeout:?}")]
    OpenTimeout {
        opened: usize,
        expected: usize,
        timeout: Duration,
    },

    #[error("Open signal from unknown connection {id} (pool size {size})")]
    UnknownConnection { id: usize, size: usize },

    #[error("Connection event channel closed")]
    EventsClosed,
}

impl PoolError {
    /// Whether the error breaks an engine invariant rather than the target
    pub fn is_fatal(&self) -> bool {
        matches!(self, PoolError::UnknownConnection { .. })
    }
}

/// Errors raised by the pacer
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Cannot dispatch over an empty connection pool")]
    EmptyPool,

    #[error("Send on connection {id} failed: {source}")]
    Transport {
        id: usize,
        #[source]
        source: TransportError,
    },
}

/// Errors raised by a result sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open result log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write result record: {0}")]
    Write(#[from] csv::Error),

    #[error("Failed to flush result log: {0}")]
    Flush(#[from] std::io::Error),
}

/// Conditions that abort the whole run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Invalid run configuration: {0}")]
    Config(String),
}

impl From<PoolError> for RunError {
    fn from(err: PoolError) -> Self {
        RunError::Invariant(err.to_string())
    }
}
