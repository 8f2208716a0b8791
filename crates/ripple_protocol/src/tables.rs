//! Row types of the replicated tables.

use crate::identity::{Identity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The replicated relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableName {
    /// The `user` table, keyed by identity.
    User,
    /// The `message` table, append-only with no primary key.
    Message,
}

impl TableName {
    /// All tables, in declaration order.
    pub const ALL: [TableName; 2] = [TableName::User, TableName::Message];

    /// Returns the table's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::User => "user",
            TableName::Message => "message",
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a row-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A row was inserted.
    Insert,
    /// A row was replaced by a new version with the same primary key.
    Update,
    /// A row was removed.
    Delete,
}

/// A row of the `user` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Primary key.
    pub identity: Identity,
    /// Display name, `None` until the user sets one.
    pub name: Option<String>,
    /// Whether the user currently has a connected client.
    pub online: bool,
}

impl User {
    /// Creates a freshly connected, unnamed user.
    pub fn connected(identity: Identity) -> Self {
        Self {
            identity,
            name: None,
            online: true,
        }
    }
}

/// A row of the `message` table.
///
/// Messages are immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identity of the sending user. Not enforced as a foreign key.
    pub sender: Identity,
    /// Server-assigned send time, used for ordering.
    pub sent: Timestamp,
    /// Message body.
    pub text: String,
}
