//! Error types for the protocol crate.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeded the maximum allowed size.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Declared frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// An identity string could not be parsed.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
