//! In-memory chat tables and the reducers that change them.
//!
//! Every reducer returns the committed changes as a [`DatabaseUpdate`]. An
//! empty update means the reducer changed nothing.

use ripple_protocol::{
    DatabaseUpdate, Identity, Message, ReducerCall, ReducerEvent, ReducerKind, RowChange,
    TableChange, TableName, Timestamp, User,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The `user` and `message` tables.
#[derive(Debug, Default)]
pub struct ChatDatabase {
    users: BTreeMap<Identity, User>,
    messages: Vec<Message>,
    last_timestamp: Timestamp,
}

impl ChatDatabase {
    /// Creates empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a user by identity.
    pub fn user(&self, identity: &Identity) -> Option<&User> {
        self.users.get(identity)
    }

    /// All users, ordered by identity.
    pub fn users(&self) -> impl Iterator<Item = &User> + '_ {
        self.users.values()
    }

    /// All messages in commit order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Every row of the given tables, as inserts.
    pub fn snapshot(&self, tables: &[TableName]) -> DatabaseUpdate {
        let mut update = DatabaseUpdate::new();
        if tables.contains(&TableName::User) {
            for user in self.users.values() {
                update.push(TableChange::User(RowChange::Insert(user.clone())));
            }
        }
        if tables.contains(&TableName::Message) {
            for message in &self.messages {
                update.push(TableChange::Message(RowChange::Insert(message.clone())));
            }
        }
        update
    }

    /// Runs a client-invoked reducer.
    pub fn call(&mut self, caller: Identity, call: ReducerCall) -> (DatabaseUpdate, ReducerEvent) {
        let kind = call.kind();
        let update = match call {
            ReducerCall::SetName { name } => self.set_name(caller, name),
            ReducerCall::SendMessage { text } => self.send_message(caller, text),
        };
        (update, self.event(caller, kind))
    }

    /// Marks the caller online, creating their user row on first connect.
    pub fn client_connected(&mut self, caller: Identity) -> (DatabaseUpdate, ReducerEvent) {
        let mut update = DatabaseUpdate::new();
        match self.users.get_mut(&caller) {
            Some(user) if user.online => {
                debug!(identity = %caller.short_form(), "already online");
            }
            Some(user) => {
                let old = user.clone();
                user.online = true;
                update.push(TableChange::User(RowChange::Update {
                    old,
                    new: user.clone(),
                }));
            }
            None => {
                let user = User::connected(caller);
                self.users.insert(caller, user.clone());
                update.push(TableChange::User(RowChange::Insert(user)));
            }
        }
        info!(identity = %caller.short_form(), "client connected");
        (update, self.event(caller, ReducerKind::ClientConnected))
    }

    /// Marks the caller offline.
    pub fn client_disconnected(&mut self, caller: Identity) -> (DatabaseUpdate, ReducerEvent) {
        let mut update = DatabaseUpdate::new();
        match self.users.get_mut(&caller) {
            Some(user) if user.online => {
                let old = user.clone();
                user.online = false;
                update.push(TableChange::User(RowChange::Update {
                    old,
                    new: user.clone(),
                }));
                info!(identity = %caller.short_form(), "client disconnected");
            }
            Some(_) => debug!(identity = %caller.short_form(), "already offline"),
            None => warn!(
                identity = %caller.short_form(),
                "disconnect event for unknown user"
            ),
        }
        (update, self.event(caller, ReducerKind::ClientDisconnected))
    }

    fn set_name(&mut self, caller: Identity, name: String) -> DatabaseUpdate {
        let mut update = DatabaseUpdate::new();
        match self.users.get_mut(&caller) {
            Some(user) => {
                let old = user.clone();
                user.name = Some(name);
                update.push(TableChange::User(RowChange::Update {
                    old,
                    new: user.clone(),
                }));
            }
            None => debug!(identity = %caller.short_form(), "set_name from unknown user ignored"),
        }
        update
    }

    fn send_message(&mut self, caller: Identity, text: String) -> DatabaseUpdate {
        let message = Message {
            sender: caller,
            sent: self.next_timestamp(),
            text,
        };
        info!(sender = %caller.short_form(), text = %message.text, "message");
        self.messages.push(message.clone());

        let mut update = DatabaseUpdate::new();
        update.push(TableChange::Message(RowChange::Insert(message)));
        update
    }

    fn event(&mut self, caller: Identity, reducer: ReducerKind) -> ReducerEvent {
        ReducerEvent {
            caller,
            reducer,
            timestamp: self.next_timestamp(),
        }
    }

    /// Wall-clock time, bumped so that no two calls return the same value.
    fn next_timestamp(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let next = if now > self.last_timestamp {
            now
        } else {
            Timestamp::from_micros(self.last_timestamp.as_micros().saturating_add(1))
        };
        self.last_timestamp = next;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_protocol::ChangeKind;

    fn id(byte: u8) -> Identity {
        Identity::from_bytes([byte; 32])
    }

    fn kinds(update: &DatabaseUpdate) -> Vec<(TableName, ChangeKind)> {
        update
            .changes
            .iter()
            .map(|c| (c.table(), c.kind()))
            .collect()
    }

    #[test]
    fn first_connect_inserts_unnamed_online_user() {
        let mut db = ChatDatabase::new();
        let (update, event) = db.client_connected(id(1));

        assert_eq!(kinds(&update), vec![(TableName::User, ChangeKind::Insert)]);
        assert_eq!(event.reducer, ReducerKind::ClientConnected);
        let user = db.user(&id(1)).unwrap();
        assert!(user.online);
        assert!(user.name.is_none());
    }

    #[test]
    fn reconnect_updates_presence() {
        let mut db = ChatDatabase::new();
        db.client_connected(id(1));
        let (update, _) = db.client_disconnected(id(1));
        assert_eq!(kinds(&update), vec![(TableName::User, ChangeKind::Update)]);
        assert!(!db.user(&id(1)).unwrap().online);

        let (update, _) = db.client_connected(id(1));
        match &update.changes[..] {
            [TableChange::User(RowChange::Update { old, new })] => {
                assert!(!old.online);
                assert!(new.online);
            }
            other => panic!("unexpected changes {other:?}"),
        }
    }

    #[test]
    fn disconnect_of_unknown_user_changes_nothing() {
        let mut db = ChatDatabase::new();
        let (update, event) = db.client_disconnected(id(9));
        assert!(update.is_empty());
        assert_eq!(event.reducer, ReducerKind::ClientDisconnected);
    }

    #[test]
    fn set_name_updates_caller_only() {
        let mut db = ChatDatabase::new();
        db.client_connected(id(1));
        db.client_connected(id(2));

        let (update, event) = db.call(id(1), ReducerCall::SetName { name: "Alice".into() });
        assert_eq!(kinds(&update), vec![(TableName::User, ChangeKind::Update)]);
        assert_eq!(event.caller, id(1));
        assert_eq!(db.user(&id(1)).unwrap().name.as_deref(), Some("Alice"));
        assert!(db.user(&id(2)).unwrap().name.is_none());
    }

    #[test]
    fn set_name_without_user_is_noop() {
        let mut db = ChatDatabase::new();
        let (update, _) = db.call(id(1), ReducerCall::SetName { name: "Ghost".into() });
        assert!(update.is_empty());
        assert!(db.user(&id(1)).is_none());
    }

    #[test]
    fn send_message_records_sender_and_time() {
        let mut db = ChatDatabase::new();
        let (update, event) = db.call(id(3), ReducerCall::SendMessage { text: "hi".into() });

        assert_eq!(kinds(&update), vec![(TableName::Message, ChangeKind::Insert)]);
        assert_eq!(event.reducer, ReducerKind::SendMessage);
        let message = &db.messages()[0];
        assert_eq!(message.sender, id(3));
        assert_eq!(message.text, "hi");
        assert!(message.sent < event.timestamp);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut db = ChatDatabase::new();
        for i in 0..200 {
            db.call(id(1), ReducerCall::SendMessage { text: i.to_string() });
        }
        assert!(db.messages().windows(2).all(|w| w[0].sent < w[1].sent));
    }

    #[test]
    fn snapshot_respects_tables() {
        let mut db = ChatDatabase::new();
        db.client_connected(id(1));
        db.call(id(1), ReducerCall::SendMessage { text: "a".into() });

        assert_eq!(db.snapshot(&TableName::ALL).len(), 2);
        assert_eq!(
            kinds(&db.snapshot(&[TableName::Message])),
            vec![(TableName::Message, ChangeKind::Insert)]
        );
        assert!(db.snapshot(&[]).is_empty());
    }
}
