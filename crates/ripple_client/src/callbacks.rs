//! Event context and per-table callback registries.

use crate::store::{ClientCache, TableRow};
use ripple_protocol::{Identity, ReducerEvent, RowChange, TableChange};

/// Why a row change reached the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The row existed when the subscription was applied.
    SubscribeApplied,
    /// The row changed after the subscription, as the result of a reducer.
    Reducer(ReducerEvent),
}

impl Event {
    /// Returns true for snapshot-origin events.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Event::SubscribeApplied)
    }

    /// Returns the reducer event for live-origin events.
    pub fn reducer_event(&self) -> Option<&ReducerEvent> {
        match self {
            Event::SubscribeApplied => None,
            Event::Reducer(event) => Some(event),
        }
    }
}

/// Context handed to every callback.
///
/// The mirror is already updated when a callback runs.
pub struct EventContext<'a> {
    /// Read-only view of the mirror.
    pub db: &'a ClientCache,
    /// What caused the callback.
    pub event: &'a Event,
    /// This client's identity, once the server has assigned one.
    pub identity: Option<Identity>,
}

/// Callback for row inserts and deletes.
pub type RowCallback<R> = Box<dyn Fn(&EventContext<'_>, &R) + Send>;

/// Callback for row updates, receiving the old and new row.
pub type UpdateCallback<R> = Box<dyn Fn(&EventContext<'_>, &R, &R) + Send>;

/// Callback fired once the full snapshot has been applied.
pub type SnapshotCallback = Box<dyn Fn(&EventContext<'_>) + Send>;

/// Callback fired for every post-snapshot change, in commit order.
pub type LiveChangeCallback = Box<dyn Fn(&EventContext<'_>, &TableChange) + Send>;

/// Insert/update/delete observers for one table.
pub struct TableCallbacks<R: TableRow> {
    on_insert: Vec<RowCallback<R>>,
    on_update: Vec<UpdateCallback<R>>,
    on_delete: Vec<RowCallback<R>>,
}

impl<R: TableRow> TableCallbacks<R> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            on_insert: Vec::new(),
            on_update: Vec::new(),
            on_delete: Vec::new(),
        }
    }

    /// Registers a callback for inserted rows.
    pub fn on_insert(&mut self, callback: impl Fn(&EventContext<'_>, &R) + Send + 'static) {
        self.on_insert.push(Box::new(callback));
    }

    /// Registers a callback for updated rows.
    pub fn on_update(&mut self, callback: impl Fn(&EventContext<'_>, &R, &R) + Send + 'static) {
        self.on_update.push(Box::new(callback));
    }

    /// Registers a callback for deleted rows.
    pub fn on_delete(&mut self, callback: impl Fn(&EventContext<'_>, &R) + Send + 'static) {
        self.on_delete.push(Box::new(callback));
    }

    /// Invokes the callbacks matching an applied change, in registration order.
    pub(crate) fn fire(&self, ctx: &EventContext<'_>, change: &RowChange<R>) {
        match change {
            RowChange::Insert(row) => self.on_insert.iter().for_each(|cb| cb(ctx, row)),
            RowChange::Update { old, new } => {
                self.on_update.iter().for_each(|cb| cb(ctx, old, new))
            }
            RowChange::Delete(row) => self.on_delete.iter().for_each(|cb| cb(ctx, row)),
        }
    }
}

impl<R: TableRow> Default for TableCallbacks<R> {
    fn default() -> Self {
        Self::new()
    }
}
