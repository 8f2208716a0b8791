//! Protocol messages exchanged between client and server.

use crate::codec::encode;
use crate::error::ProtocolResult;
use crate::identity::{Identity, Timestamp};
use crate::tables::{ChangeKind, Message, TableName, User};
use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Largest reducer argument, in bytes, the server accepts.
///
/// A user update carries the name twice, so any row built from an accepted
/// argument still fits in one frame alongside its envelope.
pub const MAX_ARGUMENT_LEN: usize = crate::codec::MAX_FRAME_LEN / 4;

/// A message sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Opens a session. Must be the first message on a connection.
    Connect(ConnectRequest),
    /// Subscribes to a set of tables.
    Subscribe {
        /// Tables to replicate.
        tables: Vec<TableName>,
    },
    /// Invokes a reducer. Fire-and-forget.
    CallReducer(ReducerCall),
}

/// Session-opening request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Client protocol version.
    pub protocol_version: u16,
    /// Name of the database to attach to.
    pub database: String,
    /// Previously issued token, if any.
    pub token: Option<String>,
}

impl ConnectRequest {
    /// Creates a connect request for the current protocol version.
    pub fn new(database: impl Into<String>, token: Option<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            database: database.into(),
            token,
        }
    }
}

/// A reducer invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReducerCall {
    /// Sets the caller's display name.
    SetName {
        /// New display name.
        name: String,
    },
    /// Posts a chat message.
    SendMessage {
        /// Message body.
        text: String,
    },
}

impl ReducerCall {
    /// Returns the kind of reducer this call invokes.
    pub fn kind(&self) -> ReducerKind {
        match self {
            ReducerCall::SetName { .. } => ReducerKind::SetName,
            ReducerCall::SendMessage { .. } => ReducerKind::SendMessage,
        }
    }

    /// Byte length of the call's string argument.
    pub fn argument_len(&self) -> usize {
        match self {
            ReducerCall::SetName { name } => name.len(),
            ReducerCall::SendMessage { text } => text.len(),
        }
    }
}

/// Every reducer the server runs, including lifecycle reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReducerKind {
    /// Runs automatically when a client connects.
    ClientConnected,
    /// Runs automatically when a client disconnects.
    ClientDisconnected,
    /// `set_name(name)`.
    SetName,
    /// `send_message(text)`.
    SendMessage,
}

impl ReducerKind {
    /// Returns the reducer's name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReducerKind::ClientConnected => "client_connected",
            ReducerKind::ClientDisconnected => "client_disconnected",
            ReducerKind::SetName => "set_name",
            ReducerKind::SendMessage => "send_message",
        }
    }
}

/// The reducer execution that produced a live update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducerEvent {
    /// Identity that caused the reducer to run.
    pub caller: Identity,
    /// Which reducer ran.
    pub reducer: ReducerKind,
    /// Server time of the execution.
    pub timestamp: Timestamp,
}

/// A single row-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowChange<R> {
    /// Row inserted.
    Insert(R),
    /// Row replaced.
    Update {
        /// Previous version.
        old: R,
        /// New version.
        new: R,
    },
    /// Row removed.
    Delete(R),
}

impl<R> RowChange<R> {
    /// Returns the kind of this change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            RowChange::Insert(_) => ChangeKind::Insert,
            RowChange::Update { .. } => ChangeKind::Update,
            RowChange::Delete(_) => ChangeKind::Delete,
        }
    }
}

/// A row change tagged with its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableChange {
    /// Change to the `user` table.
    User(RowChange<User>),
    /// Change to the `message` table.
    Message(RowChange<Message>),
}

impl TableChange {
    /// Returns the table this change applies to.
    pub fn table(&self) -> TableName {
        match self {
            TableChange::User(_) => TableName::User,
            TableChange::Message(_) => TableName::Message,
        }
    }

    /// Returns the kind of this change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            TableChange::User(change) => change.kind(),
            TableChange::Message(change) => change.kind(),
        }
    }
}

/// An ordered set of row changes committed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUpdate {
    /// Changes in commit order.
    pub changes: Vec<TableChange>,
}

impl DatabaseUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change.
    pub fn push(&mut self, change: TableChange) {
        self.changes.push(change);
    }

    /// Returns true if the update carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns a copy containing only changes to the given tables.
    pub fn filtered(&self, tables: &[TableName]) -> Self {
        Self {
            changes: self
                .changes
                .iter()
                .filter(|c| tables.contains(&c.table()))
                .cloned()
                .collect(),
        }
    }

    /// Splits the update into consecutive chunks of roughly `budget` encoded
    /// bytes each, keeping change order.
    ///
    /// A change larger than `budget` gets a chunk of its own. Always returns
    /// at least one chunk, which is empty if the update is.
    pub fn into_chunks(self, budget: usize) -> ProtocolResult<Vec<DatabaseUpdate>> {
        let mut chunks = Vec::new();
        let mut current = DatabaseUpdate::new();
        let mut size = 0;
        for change in self.changes {
            let len = encode(&change)?.len();
            if !current.is_empty() && size + len > budget {
                chunks.push(std::mem::take(&mut current));
                size = 0;
            }
            size += len;
            current.push(change);
        }
        chunks.push(current);
        Ok(chunks)
    }
}

/// A message sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The session was accepted.
    IdentityToken {
        /// The client's identity.
        identity: Identity,
        /// Token to present on later connects to keep the same identity.
        token: String,
    },
    /// The session was refused.
    ConnectRejected {
        /// Human-readable reason.
        reason: String,
    },
    /// Leading part of a snapshot too large for one frame. The rows are held
    /// until the `InitialSubscription` that completes the snapshot.
    SubscriptionChunk(DatabaseUpdate),
    /// Every row of the subscribed tables at subscription time, or the last
    /// part of them after one or more `SubscriptionChunk`s.
    InitialSubscription(DatabaseUpdate),
    /// Changes committed by one reducer after the subscription.
    TransactionUpdate {
        /// The committed changes.
        update: DatabaseUpdate,
        /// The reducer that produced them.
        event: ReducerEvent,
    },
}
