//! Replicated table store: the client's local mirror of server tables.
//!
//! The store is populated exclusively by the subscription engine from
//! server-confirmed diffs. Application code only reads from it.

use crate::error::{ClientError, ClientResult};
use ripple_protocol::{Identity, Message, TableName, User};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

/// A row type that can be mirrored in a [`Table`].
pub trait TableRow: Clone + PartialEq + fmt::Debug + Send + 'static {
    /// The table this row belongs to.
    const TABLE: TableName;

    /// Primary key type. Tables without a primary key use `()`.
    type Key: Eq + Hash + Clone + fmt::Debug;

    /// Returns the row's primary key, or `None` if the table has none.
    fn primary_key(&self) -> Option<Self::Key>;
}

impl TableRow for User {
    const TABLE: TableName = TableName::User;
    type Key = Identity;

    fn primary_key(&self) -> Option<Identity> {
        Some(self.identity)
    }
}

impl TableRow for Message {
    const TABLE: TableName = TableName::Message;
    type Key = ();

    fn primary_key(&self) -> Option<()> {
        None
    }
}

/// In-memory mirror of one table.
///
/// Rows are kept in arrival order. Keyed tables maintain a primary key
/// index for point lookups.
pub struct Table<R: TableRow> {
    rows: BTreeMap<u64, R>,
    index: HashMap<R::Key, u64>,
    next_slot: u64,
}

impl<R: TableRow> Table<R> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            index: HashMap::new(),
            next_slot: 0,
        }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Looks up a row by primary key.
    pub fn find(&self, key: &R::Key) -> Option<&R> {
        self.index.get(key).and_then(|slot| self.rows.get(slot))
    }

    /// Iterates all rows in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.rows.values()
    }

    /// Inserts a new row.
    ///
    /// Fails if a row with the same primary key is already present; the
    /// existing row is left untouched.
    pub(crate) fn insert(&mut self, row: R) -> ClientResult<()> {
        let slot = self.next_slot;
        if let Some(key) = row.primary_key() {
            if self.index.contains_key(&key) {
                return Err(ClientError::invariant(
                    R::TABLE,
                    format!("insert of duplicate key {key:?}"),
                ));
            }
            self.index.insert(key, slot);
        }
        self.rows.insert(slot, row);
        self.next_slot += 1;
        Ok(())
    }

    /// Replaces `old` with `new`, returning the row previously held by the mirror.
    pub(crate) fn update(&mut self, old: &R, new: R) -> ClientResult<R> {
        if old.primary_key() != new.primary_key() {
            return Err(ClientError::invariant(
                R::TABLE,
                format!(
                    "update changes primary key from {:?} to {:?}",
                    old.primary_key(),
                    new.primary_key()
                ),
            ));
        }

        let slot = self.locate(old).ok_or_else(|| {
            ClientError::invariant(R::TABLE, format!("update of absent row {old:?}"))
        })?;
        let previous = self.rows.insert(slot, new);
        previous.ok_or_else(|| ClientError::invariant(R::TABLE, "index points at empty slot"))
    }

    /// Removes a row, returning the copy held by the mirror.
    pub(crate) fn delete(&mut self, row: &R) -> ClientResult<R> {
        let slot = self.locate(row).ok_or_else(|| {
            ClientError::invariant(R::TABLE, format!("delete of absent row {row:?}"))
        })?;
        if let Some(key) = row.primary_key() {
            self.index.remove(&key);
        }
        self.rows
            .remove(&slot)
            .ok_or_else(|| ClientError::invariant(R::TABLE, "index points at empty slot"))
    }

    /// Removes every row.
    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    /// Finds the slot of a row: by key for keyed tables, by value otherwise.
    fn locate(&self, row: &R) -> Option<u64> {
        match row.primary_key() {
            Some(key) => self.index.get(&key).copied(),
            None => self
                .rows
                .iter()
                .find(|(_, existing)| *existing == row)
                .map(|(slot, _)| *slot),
        }
    }
}

impl<R: TableRow> Default for Table<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TableRow> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("table", &R::TABLE)
            .field("rows", &self.rows.len())
            .finish()
    }
}

/// The full local mirror: one [`Table`] per replicated relation.
#[derive(Debug, Default)]
pub struct ClientCache {
    users: Table<User>,
    messages: Table<Message>,
}

impl ClientCache {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `user` table.
    pub fn users(&self) -> &Table<User> {
        &self.users
    }

    /// The `message` table.
    pub fn messages(&self) -> &Table<Message> {
        &self.messages
    }

    /// Looks up a user by identity.
    pub fn find_user(&self, identity: &Identity) -> Option<&User> {
        self.users.find(identity)
    }

    /// Returns all messages sorted by send time.
    ///
    /// The sort is stable, so messages with equal timestamps keep their
    /// arrival order.
    pub fn messages_by_time(&self) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self.messages.iter().collect();
        messages.sort_by_key(|m| m.sent);
        messages
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.users.len() + self.messages.len()
    }

    pub(crate) fn users_mut(&mut self) -> &mut Table<User> {
        &mut self.users
    }

    pub(crate) fn messages_mut(&mut self) -> &mut Table<Message> {
        &mut self.messages
    }

    /// Discards the whole mirror.
    pub(crate) fn clear(&mut self) {
        self.users.clear();
        self.messages.clear();
    }
}
