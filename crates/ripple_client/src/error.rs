//! Error types for the client.

use ripple_protocol::{ProtocolError, TableName};
use std::io;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the synchronization client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The connect attempt failed or was rejected by the server.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The session ended abnormally.
    #[error("disconnected: {reason}")]
    Disconnected {
        /// Why the session ended.
        reason: String,
    },

    /// A diff referenced a row the mirror cannot reconcile.
    #[error("invariant violation in table {table}: {detail}")]
    InvariantViolation {
        /// Table the diff targeted.
        table: TableName,
        /// What was wrong with the diff.
        detail: String,
    },

    /// The server sent a message that is not valid in the current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Encoding or framing failed.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// The credential store could not be read or written.
    #[error("credential store error: {0}")]
    Credentials(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The transport has already been closed.
    #[error("not connected to server")]
    NotConnected,
}

impl ClientError {
    /// Creates a disconnection error.
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }

    /// Creates an invariant violation for a table.
    pub fn invariant(table: TableName, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            table,
            detail: detail.into(),
        }
    }

    /// Returns true if the error must end the event loop.
    ///
    /// Only invariant violations are recovered locally.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ClientError::InvariantViolation { .. })
    }
}
