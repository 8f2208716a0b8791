//! # Ripple Client
//!
//! Client-side state synchronization engine for Ripple chat.
//!
//! This crate provides:
//! - A local mirror of the server's `user` and `message` tables
//! - Snapshot-then-live subscription handling with row callbacks
//! - A thread-safe command queue between input and the event loop
//! - Token persistence so a client keeps its identity across runs
//! - Console rendering of presence notices and messages
//! - TCP and mock transports
//!
//! ## Architecture
//!
//! The client never mutates the mirror on its own. Reducer calls are
//! fire-and-forget; their effects come back from the server as diffs, and
//! only then reach the mirror and the callbacks:
//! 1. Connect and receive an identity and token
//! 2. Subscribe to all tables and receive the snapshot
//! 3. Apply live transaction updates in commit order
//!
//! ## Key Invariants
//!
//! - Mirror changes and callbacks run only on the event loop thread
//! - Snapshot-ready callbacks fire exactly once, before any live change
//! - Snapshot rows never reach live-change observers
//! - The transport is closed exactly once

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callbacks;
mod config;
mod connection;
mod console;
mod credentials;
mod error;
mod presence;
mod queue;
mod store;
mod subscription;
mod tcp;
mod transport;

pub use callbacks::{
    Event, EventContext, LiveChangeCallback, RowCallback, SnapshotCallback, TableCallbacks,
    UpdateCallback,
};
pub use config::{ClientConfig, DEFAULT_DATABASE, DEFAULT_ENDPOINT};
pub use connection::{ConnectCallback, DbConnection, ShutdownSignal};
pub use console::{read_commands, register_callbacks, ChatPrinter};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ClientError, ClientResult};
pub use presence::{
    display_name, format_message, online_notice, sender_display, update_notice, UNKNOWN_SENDER,
};
pub use queue::{Command, CommandQueue};
pub use store::{ClientCache, Table, TableRow};
pub use subscription::{
    ApplyReport, SubscriptionEngine, SubscriptionState, SubscriptionStats, DEFAULT_MAX_PENDING,
};
pub use tcp::TcpTransport;
pub use transport::{MockTransport, Transport};
