//! # Ripple Protocol
//!
//! Wire types and codecs shared by the Ripple client and server.
//!
//! This crate provides:
//! - `Identity` and `Timestamp` primitives
//! - Row types for the replicated tables (`User`, `Message`)
//! - Client and server messages (connect, subscribe, reducer calls, updates)
//! - CBOR encoding and length-prefixed framing
//!
//! This is a pure protocol crate. The only I/O it performs is framing over
//! caller-supplied `Read`/`Write` handles.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod identity;
mod messages;
mod tables;

pub use codec::{
    decode, encode, read_frame, write_frame, MAX_FRAME_LEN, SNAPSHOT_CHUNK_LEN,
};
pub use error::{ProtocolError, ProtocolResult};
pub use identity::{Identity, Timestamp, SHORT_FORM_LEN};
pub use messages::{
    ClientMessage, ConnectRequest, DatabaseUpdate, ReducerCall, ReducerEvent, ReducerKind,
    RowChange, ServerMessage, TableChange, MAX_ARGUMENT_LEN, PROTOCOL_VERSION,
};
pub use tables::{ChangeKind, Message, TableName, User};
