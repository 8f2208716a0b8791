//! # Ripple Server
//!
//! Reference chat server for Ripple.
//!
//! This crate provides:
//! - In-memory `user` and `message` tables
//! - Reducers (`set_name`, `send_message`) and connect/disconnect hooks
//! - Identity tokens signed with HMAC-SHA256
//! - Subscriptions: a snapshot followed by live transaction updates
//! - A TCP listener speaking length-prefixed CBOR frames
//!
//! # Protocol
//!
//! 1. Client sends `Connect` (with a token if it has one)
//! 2. Server replies `IdentityToken`, or `ConnectRejected`
//! 3. Client sends `Subscribe`; server replies with the snapshot
//! 4. Every later commit touching a subscribed table is pushed as a
//!    `TransactionUpdate`
//!
//! Snapshot and live registration happen under one lock, so no commit can
//! fall between them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod database;
mod error;
mod listener;
mod server;

pub use auth::TokenIssuer;
pub use config::{ServerConfig, DEFAULT_DATABASE};
pub use database::ChatDatabase;
pub use error::{ServerError, ServerResult};
pub use listener::serve;
pub use server::{ChatServer, ConnectionId, SessionHandle};
