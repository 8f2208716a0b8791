//! Session lifecycle and the cooperative event loop.

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, ClientResult};
use crate::queue::CommandQueue;
use crate::subscription::{SubscriptionEngine, SubscriptionState};
use crate::transport::Transport;
use ripple_protocol::{Identity, ProtocolError, ServerMessage, TableName, MAX_ARGUMENT_LEN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Callback fired once the server has accepted the session.
pub type ConnectCallback = Box<dyn Fn(&Identity, &str) + Send>;

/// Cross-thread request to stop the event loop.
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. The loop exits at its next iteration boundary.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An authenticated session with the server.
///
/// The connection owns the mirror and all callbacks. Every mirror mutation
/// and callback happens on the thread that drives [`DbConnection::frame_tick`].
pub struct DbConnection<T: Transport> {
    config: ClientConfig,
    transport: T,
    engine: SubscriptionEngine,
    identity: Option<Identity>,
    credentials: Arc<dyn CredentialStore>,
    on_connect: Vec<ConnectCallback>,
    closed: bool,
}

impl<T: Transport> DbConnection<T> {
    /// Creates an unconnected session. Call [`DbConnection::connect`] next.
    pub fn new(
        config: ClientConfig,
        transport: T,
        engine: SubscriptionEngine,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            transport,
            engine,
            identity: None,
            credentials,
            on_connect: Vec::new(),
            closed: false,
        }
    }

    /// Registers a callback fired when the session is accepted.
    pub fn on_connect(&mut self, callback: impl Fn(&Identity, &str) + Send + 'static) {
        self.on_connect.push(Box::new(callback));
    }

    /// Waits for the server to accept the session, then subscribes to all tables.
    ///
    /// The transport must already have sent the session-opening request. On
    /// acceptance the issued token is persisted so later runs keep the same
    /// identity.
    pub fn connect(&mut self) -> ClientResult<Identity> {
        let deadline = Instant::now() + self.config.connect_timeout;
        let (identity, token) = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Connection(format!(
                    "no response from {} within {:?}",
                    self.config.endpoint, self.config.connect_timeout
                )));
            }
            match self.transport.poll(remaining)? {
                Some(ServerMessage::IdentityToken { identity, token }) => break (identity, token),
                Some(ServerMessage::ConnectRejected { reason }) => {
                    return Err(ClientError::Connection(format!("rejected: {reason}")));
                }
                Some(other) => {
                    return Err(ClientError::Protocol(format!(
                        "expected identity token, got {other:?}"
                    )));
                }
                None => continue,
            }
        };

        self.identity = Some(identity);
        self.engine.set_identity(identity);
        self.credentials.save(&token)?;
        info!(identity = %identity.short_form(), "session accepted");
        for callback in &self.on_connect {
            callback(&identity, &token);
        }

        let subscribe = self.engine.subscribe(&TableName::ALL);
        self.transport.send(&subscribe)?;
        Ok(identity)
    }

    /// The identity assigned by the server, once connected.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    /// The subscription engine and its mirror.
    pub fn engine(&self) -> &SubscriptionEngine {
        &self.engine
    }

    /// Mutable access to the engine, for registering callbacks.
    pub fn engine_mut(&mut self) -> &mut SubscriptionEngine {
        &mut self.engine
    }

    /// Returns true until [`DbConnection::disconnect`] has run.
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Drains every server message received so far, without blocking.
    ///
    /// Returns the number of messages processed. Invariant violations are
    /// logged and skipped; any other error ends the session, as does a
    /// snapshot still missing after the subscribe timeout.
    pub fn frame_tick(&mut self) -> ClientResult<usize> {
        let mut processed = 0;
        while let Some(message) = self.transport.poll(Duration::ZERO)? {
            self.handle(message)?;
            processed += 1;
        }
        if let Some(waited) = self.engine.pending_for() {
            if waited > self.config.subscribe_timeout {
                return Err(ClientError::Protocol(format!(
                    "no snapshot within {:?}",
                    self.config.subscribe_timeout
                )));
            }
        }
        Ok(processed)
    }

    fn handle(&mut self, message: ServerMessage) -> ClientResult<()> {
        match message {
            ServerMessage::SubscriptionChunk(chunk) => {
                self.engine.apply_snapshot_chunk(chunk)?;
            }
            ServerMessage::InitialSubscription(snapshot) => {
                self.engine.apply_snapshot(snapshot)?;
            }
            ServerMessage::TransactionUpdate { update, event } => {
                self.engine.apply_transaction(update, event)?;
            }
            ServerMessage::ConnectRejected { reason } => {
                return Err(ClientError::disconnected(reason));
            }
            ServerMessage::IdentityToken { .. } => {
                return Err(ClientError::Protocol(
                    "identity token received on an established session".into(),
                ));
            }
        }
        Ok(())
    }

    /// Sends every queued command as a reducer call, oldest first.
    ///
    /// Returns the number of commands sent. A command too large to send is
    /// logged and dropped; the rest still go out.
    pub fn process_commands(&mut self, queue: &CommandQueue) -> ClientResult<usize> {
        let mut sent = 0;
        while let Some(command) = queue.try_dequeue() {
            let call = command.into_reducer_call();
            let reducer = call.kind().as_str();
            if call.argument_len() > MAX_ARGUMENT_LEN {
                warn!(
                    reducer,
                    bytes = call.argument_len(),
                    max = MAX_ARGUMENT_LEN,
                    "command too long, dropped"
                );
                continue;
            }
            debug!(reducer, "calling reducer");
            match self.transport.call_reducer(call) {
                Ok(()) => sent += 1,
                Err(ClientError::Codec(e @ ProtocolError::FrameTooLarge { .. })) => {
                    warn!(reducer, error = %e, "command too large to send, dropped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sent)
    }

    /// Runs the event loop until shutdown is requested or the session fails.
    ///
    /// Each iteration applies received updates, then sends queued commands,
    /// then sleeps for the poll interval. The transport is closed exactly
    /// once on every exit path.
    pub fn run(&mut self, queue: &CommandQueue, shutdown: &ShutdownSignal) -> ClientResult<()> {
        let result = self.run_loop(queue, shutdown);
        if let Err(e) = &result {
            error!(error = %e, "event loop stopped");
        }
        let closed = self.disconnect();
        result.and(closed)
    }

    fn run_loop(&mut self, queue: &CommandQueue, shutdown: &ShutdownSignal) -> ClientResult<()> {
        while !shutdown.is_triggered() {
            self.frame_tick()?;
            self.process_commands(queue)?;
            thread::sleep(self.config.poll_interval);
        }
        debug!("shutdown requested");
        Ok(())
    }

    /// Closes the session. Later calls do nothing.
    pub fn disconnect(&mut self) -> ClientResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.identity.is_none() {
            warn!("disconnecting a session that was never accepted");
        }
        if self.engine.state() == SubscriptionState::Pending {
            debug!("disconnecting before the subscription was applied");
        }
        self.transport.close()?;
        info!("disconnected");
        Ok(())
    }
}

impl<T: Transport> Drop for DbConnection<T> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::queue::Command;
    use crate::transport::MockTransport;
    use parking_lot::Mutex;
    use ripple_protocol::{
        ClientMessage, DatabaseUpdate, Message, ReducerCall, ReducerEvent, ReducerKind, RowChange,
        TableChange, Timestamp,
    };

    fn identity() -> Identity {
        Identity::from_bytes([0x42; 32])
    }

    fn config() -> ClientConfig {
        ClientConfig::default()
            .with_poll_interval(Duration::from_millis(1))
            .with_connect_timeout(Duration::from_millis(200))
    }

    fn connection(
        transport: &MockTransport,
        store: Arc<MemoryCredentialStore>,
    ) -> DbConnection<MockTransport> {
        DbConnection::new(config(), transport.clone(), SubscriptionEngine::new(), store)
    }

    fn accept(transport: &MockTransport) {
        transport.push_incoming(ServerMessage::IdentityToken {
            identity: identity(),
            token: "tok".into(),
        });
    }

    #[test]
    fn connect_saves_token_and_subscribes() {
        let transport = MockTransport::new();
        let store = Arc::new(MemoryCredentialStore::new());
        accept(&transport);

        let seen = Arc::new(Mutex::new(None));
        let mut conn = connection(&transport, Arc::clone(&store));
        let s = Arc::clone(&seen);
        conn.on_connect(move |id, token| *s.lock() = Some((*id, token.to_string())));

        assert_eq!(conn.connect().unwrap(), identity());
        assert_eq!(conn.identity(), Some(identity()));
        assert_eq!(store.load().unwrap().as_deref(), Some("tok"));
        assert_eq!(*seen.lock(), Some((identity(), "tok".to_string())));
        assert_eq!(
            transport.sent_messages(),
            vec![ClientMessage::Subscribe {
                tables: TableName::ALL.to_vec()
            }]
        );
        assert_eq!(conn.engine().state(), SubscriptionState::Pending);
        assert_eq!(conn.engine().identity(), Some(identity()));
    }

    #[test]
    fn rejected_connect_is_connection_error() {
        let transport = MockTransport::new();
        transport.push_incoming(ServerMessage::ConnectRejected {
            reason: "unknown database".into(),
        });
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        assert!(matches!(conn.connect(), Err(ClientError::Connection(_))));
    }

    #[test]
    fn silent_server_times_out() {
        let transport = MockTransport::new();
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        assert!(matches!(conn.connect(), Err(ClientError::Connection(_))));
    }

    #[test]
    fn frame_tick_drains_everything_queued() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        transport.push_incoming(ServerMessage::InitialSubscription(DatabaseUpdate::new()));
        transport.push_incoming(ServerMessage::TransactionUpdate {
            update: DatabaseUpdate {
                changes: vec![TableChange::Message(RowChange::Insert(Message {
                    sender: identity(),
                    sent: Timestamp::from_micros(1),
                    text: "hi".into(),
                }))],
            },
            event: ReducerEvent {
                caller: identity(),
                reducer: ReducerKind::SendMessage,
                timestamp: Timestamp::from_micros(1),
            },
        });

        assert_eq!(conn.frame_tick().unwrap(), 2);
        assert_eq!(conn.frame_tick().unwrap(), 0);
        assert_eq!(conn.engine().db().messages().len(), 1);
    }

    #[test]
    fn callbacks_see_local_identity() {
        let transport = MockTransport::new();
        accept(&transport);
        transport.push_incoming(ServerMessage::InitialSubscription(DatabaseUpdate::new()));

        let seen = Arc::new(Mutex::new(None));
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        let s = Arc::clone(&seen);
        conn.engine_mut()
            .on_snapshot_ready(move |ctx| *s.lock() = ctx.identity);

        conn.connect().unwrap();
        conn.frame_tick().unwrap();
        assert_eq!(*seen.lock(), Some(identity()));
    }

    #[test]
    fn commands_are_sent_in_order() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        let queue = CommandQueue::new();
        queue.enqueue(Command::parse("/name Alice"));
        queue.enqueue(Command::parse("hello"));
        assert_eq!(conn.process_commands(&queue).unwrap(), 2);

        let sent = transport.sent_messages();
        assert_eq!(
            &sent[1..],
            &[
                ClientMessage::CallReducer(ReducerCall::SetName {
                    name: "Alice".into()
                }),
                ClientMessage::CallReducer(ReducerCall::SendMessage {
                    text: "hello".into()
                }),
            ]
        );
    }

    #[test]
    fn oversized_commands_are_dropped_not_fatal() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        let queue = CommandQueue::new();
        queue.enqueue(Command::parse(&"y".repeat(MAX_ARGUMENT_LEN + 1)));
        queue.enqueue(Command::parse("rejected by the transport"));
        queue.enqueue(Command::parse("still delivered"));
        transport.push_send_error(ClientError::Codec(ProtocolError::FrameTooLarge {
            len: 2 * MAX_ARGUMENT_LEN,
            max: MAX_ARGUMENT_LEN,
        }));

        assert_eq!(conn.process_commands(&queue).unwrap(), 1);
        assert!(queue.is_empty());
        assert_eq!(
            transport.sent_messages().last(),
            Some(&ClientMessage::CallReducer(ReducerCall::SendMessage {
                text: "still delivered".into()
            }))
        );
        assert!(conn.is_open());
    }

    #[test]
    fn missing_snapshot_times_out() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = DbConnection::new(
            config().with_subscribe_timeout(Duration::from_millis(20)),
            transport.clone(),
            SubscriptionEngine::new(),
            Arc::new(MemoryCredentialStore::new()),
        );
        conn.connect().unwrap();
        assert_eq!(conn.frame_tick().unwrap(), 0);

        thread::sleep(Duration::from_millis(40));
        let result = conn.run(&CommandQueue::new(), &ShutdownSignal::new());
        assert!(matches!(result, Err(ClientError::Protocol(_))));
        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn chunked_snapshot_over_connection() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        let row = |micros, text: &str| {
            TableChange::Message(RowChange::Insert(Message {
                sender: identity(),
                sent: Timestamp::from_micros(micros),
                text: text.into(),
            }))
        };
        transport.push_incoming(ServerMessage::SubscriptionChunk(DatabaseUpdate {
            changes: vec![row(1, "first")],
        }));
        transport.push_incoming(ServerMessage::InitialSubscription(DatabaseUpdate {
            changes: vec![row(2, "second")],
        }));

        assert_eq!(conn.frame_tick().unwrap(), 2);
        assert_eq!(conn.engine().state(), SubscriptionState::Applied);
        assert_eq!(conn.engine().db().messages().len(), 2);
    }

    #[test]
    fn run_closes_transport_once_on_shutdown() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        conn.run(&CommandQueue::new(), &shutdown).unwrap();
        conn.disconnect().unwrap();
        drop(conn);

        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn run_closes_transport_on_fatal_error() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        transport.push_error(ClientError::disconnected("reset by peer"));
        let result = conn.run(&CommandQueue::new(), &ShutdownSignal::new());
        assert!(matches!(result, Err(ClientError::Disconnected { .. })));
        assert!(!conn.is_open());
        drop(conn);

        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn drop_closes_unaccepted_session() {
        let transport = MockTransport::new();
        let conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        drop(conn);
        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn server_rejection_mid_session_ends_loop() {
        let transport = MockTransport::new();
        accept(&transport);
        let mut conn = connection(&transport, Arc::new(MemoryCredentialStore::new()));
        conn.connect().unwrap();

        transport.push_incoming(ServerMessage::ConnectRejected {
            reason: "server shutting down".into(),
        });
        assert!(matches!(
            conn.frame_tick(),
            Err(ClientError::Disconnected { .. })
        ));
    }
}
