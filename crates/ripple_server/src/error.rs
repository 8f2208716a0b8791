//! Error types for the chat server.

use ripple_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the chat server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request for the session's state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The presented token was not issued by this server.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The client asked for a database this server does not host.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: client {client}, server {server}")]
    ProtocolMismatch {
        /// Version the client sent.
        client: u16,
        /// Version the server speaks.
        server: u16,
    },

    /// The connection limit has been reached.
    #[error("server full: {0} connections")]
    TooManyConnections(usize),

    /// The connection id does not belong to a live session.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Encoding or framing failed.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the client caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::NotAuthorized(_)
                | ServerError::UnknownDatabase(_)
                | ServerError::ProtocolMismatch { .. }
                | ServerError::TooManyConnections(_)
        )
    }

    /// Returns true if the server itself failed.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::UnknownConnection(_)
                | ServerError::Codec(_)
                | ServerError::Internal(_)
                | ServerError::Io(_)
        )
    }
}
