//! Subscription engine: snapshot-then-live application of server diffs.
//!
//! The engine owns the local mirror. It applies the initial snapshot as one
//! batch, then applies live transaction updates one change at a time in
//! commit order. Snapshot-origin rows never reach the live-change observers.

use crate::callbacks::{Event, EventContext, LiveChangeCallback, SnapshotCallback, TableCallbacks};
use crate::error::{ClientError, ClientResult};
use crate::store::{ClientCache, Table, TableRow};
use ripple_protocol::{
    ChangeKind, ClientMessage, DatabaseUpdate, Identity, Message, ReducerEvent, RowChange,
    TableChange, TableName, User,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Default cap on live updates held while the snapshot is pending.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No subscription requested.
    Unsubscribed,
    /// Subscribe sent; waiting for the snapshot.
    Pending,
    /// Snapshot applied; live updates flow.
    Applied,
}

/// Counters for applied diffs.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStats {
    /// Number of snapshots applied.
    pub snapshots_applied: u64,
    /// Rows received in snapshots.
    pub snapshot_rows: u64,
    /// Live changes applied.
    pub live_changes: u64,
    /// Changes rejected as invariant violations.
    pub invariant_violations: u64,
}

/// Outcome of applying one server message.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Changes applied to the mirror.
    pub applied: usize,
    /// Changes rejected. Each was skipped; the rest were applied.
    pub violations: Vec<ClientError>,
}

impl ApplyReport {
    fn merge(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.violations.extend(other.violations);
    }
}

/// Applies server diffs to the mirror and dispatches callbacks.
pub struct SubscriptionEngine {
    cache: ClientCache,
    users: TableCallbacks<User>,
    messages: TableCallbacks<Message>,
    on_snapshot_ready: Vec<SnapshotCallback>,
    on_live_change: Vec<LiveChangeCallback>,
    state: SubscriptionState,
    pending_since: Option<Instant>,
    snapshot_parts: Vec<TableChange>,
    pending_live: VecDeque<(DatabaseUpdate, ReducerEvent)>,
    max_pending: usize,
    stats: SubscriptionStats,
    identity: Option<Identity>,
}

impl SubscriptionEngine {
    /// Creates an engine with an empty mirror and no callbacks.
    pub fn new() -> Self {
        Self {
            cache: ClientCache::new(),
            users: TableCallbacks::new(),
            messages: TableCallbacks::new(),
            on_snapshot_ready: Vec::new(),
            on_live_change: Vec::new(),
            state: SubscriptionState::Unsubscribed,
            pending_since: None,
            snapshot_parts: Vec::new(),
            pending_live: VecDeque::new(),
            max_pending: DEFAULT_MAX_PENDING,
            stats: SubscriptionStats::default(),
            identity: None,
        }
    }

    /// Sets how many live updates may be held while the snapshot is pending.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Read-only view of the mirror.
    pub fn db(&self) -> &ClientCache {
        &self.cache
    }

    /// This client's identity, as handed to callbacks.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub(crate) fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Current subscription state.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// How long the snapshot has been outstanding, if one is.
    pub fn pending_for(&self) -> Option<Duration> {
        self.pending_since.map(|since| since.elapsed())
    }

    /// Counters since the engine was created.
    pub fn stats(&self) -> SubscriptionStats {
        self.stats.clone()
    }

    /// Callbacks for the `user` table.
    pub fn users(&mut self) -> &mut TableCallbacks<User> {
        &mut self.users
    }

    /// Callbacks for the `message` table.
    pub fn messages(&mut self) -> &mut TableCallbacks<Message> {
        &mut self.messages
    }

    /// Registers a callback fired once the whole snapshot is in the mirror.
    pub fn on_snapshot_ready(&mut self, callback: impl Fn(&EventContext<'_>) + Send + 'static) {
        self.on_snapshot_ready.push(Box::new(callback));
    }

    /// Registers a callback fired for every post-snapshot change.
    pub fn on_live_change(
        &mut self,
        callback: impl Fn(&EventContext<'_>, &TableChange) + Send + 'static,
    ) {
        self.on_live_change.push(Box::new(callback));
    }

    /// Starts a subscription and returns the message to send to the server.
    ///
    /// The current mirror stays readable until the snapshot replaces it.
    pub fn subscribe(&mut self, tables: &[TableName]) -> ClientMessage {
        self.state = SubscriptionState::Pending;
        self.pending_since = Some(Instant::now());
        self.snapshot_parts.clear();
        self.pending_live.clear();
        debug!(?tables, "subscription requested");
        ClientMessage::Subscribe {
            tables: tables.to_vec(),
        }
    }

    /// Drops the mirror and any buffered updates.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.snapshot_parts.clear();
        self.pending_live.clear();
        self.pending_since = None;
        self.state = SubscriptionState::Unsubscribed;
    }

    /// Holds a leading part of the snapshot until the rest arrives.
    ///
    /// Nothing touches the mirror or fires until [`Self::apply_snapshot`].
    pub fn apply_snapshot_chunk(&mut self, chunk: DatabaseUpdate) -> ClientResult<()> {
        if self.state != SubscriptionState::Pending {
            return Err(ClientError::Protocol(format!(
                "snapshot chunk received in state {:?}",
                self.state
            )));
        }
        debug!(rows = chunk.len(), "snapshot chunk received");
        self.snapshot_parts.extend(chunk.changes);
        Ok(())
    }

    /// Applies the initial snapshot.
    ///
    /// `snapshot` completes any chunks received before it. The mirror is
    /// rebuilt from scratch. Table callbacks see every row with a
    /// snapshot-origin context; snapshot-ready callbacks then fire once, and
    /// live updates buffered while the snapshot was pending are applied last.
    pub fn apply_snapshot(&mut self, snapshot: DatabaseUpdate) -> ClientResult<ApplyReport> {
        if self.state != SubscriptionState::Pending {
            return Err(ClientError::Protocol(format!(
                "initial subscription received in state {:?}",
                self.state
            )));
        }

        self.cache.clear();
        let event = Event::SubscribeApplied;
        let mut report = ApplyReport::default();
        let mut changes = std::mem::take(&mut self.snapshot_parts);
        changes.extend(snapshot.changes);
        let rows = changes.len();

        for change in changes {
            let result = match change.kind() {
                ChangeKind::Insert => self.apply_change(change, &event, false),
                kind => Err(ClientError::invariant(
                    change.table(),
                    format!("snapshot carries a {kind:?} change"),
                )),
            };
            self.record(result, &mut report)?;
        }

        self.state = SubscriptionState::Applied;
        self.pending_since = None;
        self.stats.snapshots_applied += 1;
        self.stats.snapshot_rows += rows as u64;
        info!(rows, "subscription applied");

        let ctx = EventContext {
            db: &self.cache,
            event: &event,
            identity: self.identity,
        };
        for callback in &self.on_snapshot_ready {
            callback(&ctx);
        }

        while let Some((update, reducer_event)) = self.pending_live.pop_front() {
            let buffered = self.apply_live(update, reducer_event)?;
            report.merge(buffered);
        }

        Ok(report)
    }

    /// Applies a live transaction update.
    ///
    /// Updates that arrive while the snapshot is pending are buffered.
    pub fn apply_transaction(
        &mut self,
        update: DatabaseUpdate,
        event: ReducerEvent,
    ) -> ClientResult<ApplyReport> {
        match self.state {
            SubscriptionState::Applied => self.apply_live(update, event),
            SubscriptionState::Pending => {
                if self.pending_live.len() >= self.max_pending {
                    return Err(ClientError::Protocol(format!(
                        "more than {} live updates arrived before the snapshot",
                        self.max_pending
                    )));
                }
                debug!(changes = update.len(), "buffering update until snapshot arrives");
                self.pending_live.push_back((update, event));
                Ok(ApplyReport::default())
            }
            SubscriptionState::Unsubscribed => Err(ClientError::Protocol(
                "transaction update received without a subscription".into(),
            )),
        }
    }

    fn apply_live(
        &mut self,
        update: DatabaseUpdate,
        reducer_event: ReducerEvent,
    ) -> ClientResult<ApplyReport> {
        debug!(
            reducer = reducer_event.reducer.as_str(),
            changes = update.len(),
            "applying transaction update"
        );
        let event = Event::Reducer(reducer_event);
        let mut report = ApplyReport::default();
        for change in update.changes {
            let result = self.apply_change(change, &event, true);
            self.record(result, &mut report)?;
        }
        self.stats.live_changes += report.applied as u64;
        Ok(report)
    }

    /// Mutates the mirror, then fires table callbacks and, for live changes,
    /// the live-change observers.
    fn apply_change(&mut self, change: TableChange, event: &Event, live: bool) -> ClientResult<()> {
        let applied = match change {
            TableChange::User(row) => TableChange::User(apply_row(self.cache.users_mut(), row)?),
            TableChange::Message(row) => {
                TableChange::Message(apply_row(self.cache.messages_mut(), row)?)
            }
        };

        let ctx = EventContext {
            db: &self.cache,
            event,
            identity: self.identity,
        };
        match &applied {
            TableChange::User(row) => self.users.fire(&ctx, row),
            TableChange::Message(row) => self.messages.fire(&ctx, row),
        }
        if live {
            for callback in &self.on_live_change {
                callback(&ctx, &applied);
            }
        }
        Ok(())
    }

    /// Counts a change outcome. Invariant violations are logged and kept in
    /// the report; anything else aborts.
    fn record(&mut self, result: ClientResult<()>, report: &mut ApplyReport) -> ClientResult<()> {
        match result {
            Ok(()) => {
                report.applied += 1;
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                error!(error = %e, "skipping change");
                self.stats.invariant_violations += 1;
                report.violations.push(e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for SubscriptionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies one row change to a table, returning the change as the mirror saw
/// it (updates and deletes carry the mirror's previous row).
fn apply_row<R: TableRow>(
    table: &mut Table<R>,
    change: RowChange<R>,
) -> ClientResult<RowChange<R>> {
    match change {
        RowChange::Insert(row) => {
            table.insert(row.clone())?;
            Ok(RowChange::Insert(row))
        }
        RowChange::Update { old, new } => {
            let previous = table.update(&old, new.clone())?;
            Ok(RowChange::Update { old: previous, new })
        }
        RowChange::Delete(row) => {
            let removed = table.delete(&row)?;
            Ok(RowChange::Delete(removed))
        }
    }
}
