//! Session management and live fan-out.

use crate::auth::TokenIssuer;
use crate::config::ServerConfig;
use crate::database::ChatDatabase;
use crate::error::{ServerError, ServerResult};
use parking_lot::Mutex;
use ripple_protocol::{
    ClientMessage, ConnectRequest, DatabaseUpdate, Identity, ReducerEvent, ServerMessage,
    TableName, MAX_ARGUMENT_LEN, PROTOCOL_VERSION, SNAPSHOT_CHUNK_LEN,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A newly accepted session.
///
/// Everything the server sends to the client arrives on `receiver`, in order.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session id for later calls.
    pub connection_id: ConnectionId,
    /// The client's identity.
    pub identity: Identity,
    /// Outgoing messages for the client.
    pub receiver: Receiver<ServerMessage>,
}

struct Session {
    identity: Identity,
    sender: Sender<ServerMessage>,
    subscribed: Option<Vec<TableName>>,
}

struct ServerState {
    db: ChatDatabase,
    sessions: HashMap<ConnectionId, Session>,
}

impl ServerState {
    /// Sends an update to every subscribed session, restricted to its tables.
    fn broadcast(&self, update: &DatabaseUpdate, event: &ReducerEvent) {
        if update.is_empty() {
            return;
        }
        for (id, session) in &self.sessions {
            let Some(tables) = &session.subscribed else {
                continue;
            };
            let filtered = update.filtered(tables);
            if filtered.is_empty() {
                continue;
            }
            let message = ServerMessage::TransactionUpdate {
                update: filtered,
                event: event.clone(),
            };
            if session.sender.send(message).is_err() {
                debug!(connection = %id, "session receiver dropped");
            }
        }
    }
}

/// The chat server.
///
/// Reducers run one at a time under a single lock, which also covers
/// fan-out, so every session sees commits in the same order.
pub struct ChatServer {
    config: ServerConfig,
    tokens: TokenIssuer,
    state: Mutex<ServerState>,
}

impl ChatServer {
    /// Creates a server with empty tables.
    pub fn new(config: ServerConfig) -> Self {
        let secret = match &config.token_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("no token secret configured; tokens will not survive a restart");
                rand::random::<[u8; 32]>().to_vec()
            }
        };
        Self {
            tokens: TokenIssuer::new(secret),
            config,
            state: Mutex::new(ServerState {
                db: ChatDatabase::new(),
                sessions: HashMap::new(),
            }),
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of open sessions.
    pub fn connection_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Runs `f` against the tables.
    pub fn with_database<T>(&self, f: impl FnOnce(&ChatDatabase) -> T) -> T {
        f(&self.state.lock().db)
    }

    /// Accepts a session.
    ///
    /// A request without a token gets a fresh identity; a valid token keeps
    /// the identity it was issued for. The first message on the session is
    /// always the identity token.
    pub fn connect(&self, request: ConnectRequest) -> ServerResult<SessionHandle> {
        if request.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::ProtocolMismatch {
                client: request.protocol_version,
                server: PROTOCOL_VERSION,
            });
        }
        if request.database != self.config.database {
            return Err(ServerError::UnknownDatabase(request.database));
        }

        let identity = match &request.token {
            Some(token) => self.tokens.verify(token)?,
            None => Identity::from_bytes(rand::random()),
        };
        let token = self.tokens.issue(&identity)?;

        let mut state = self.state.lock();
        if state.sessions.len() >= self.config.max_connections {
            return Err(ServerError::TooManyConnections(state.sessions.len()));
        }

        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel();
        sender
            .send(ServerMessage::IdentityToken { identity, token })
            .map_err(|_| ServerError::Internal("session channel closed".into()))?;
        state.sessions.insert(
            connection_id,
            Session {
                identity,
                sender,
                subscribed: None,
            },
        );

        let (update, event) = state.db.client_connected(identity);
        state.broadcast(&update, &event);
        info!(connection = %connection_id, identity = %identity.short_form(), "session opened");

        Ok(SessionHandle {
            connection_id,
            identity,
            receiver,
        })
    }

    /// Handles one message from an accepted session.
    pub fn handle_message(
        &self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> ServerResult<()> {
        let mut state = self.state.lock();
        let identity = state
            .sessions
            .get(&connection)
            .map(|s| s.identity)
            .ok_or_else(|| ServerError::UnknownConnection(connection.to_string()))?;

        match message {
            ClientMessage::Connect(_) => Err(ServerError::InvalidRequest(
                "session is already open".into(),
            )),
            ClientMessage::Subscribe { tables } => {
                let snapshot = state.db.snapshot(&tables);
                let rows = snapshot.len();
                let mut chunks = snapshot.into_chunks(SNAPSHOT_CHUNK_LEN)?;
                let last = chunks.pop().unwrap_or_default();
                debug!(connection = %connection, rows, frames = chunks.len() + 1, "subscribed");
                if let Some(session) = state.sessions.get_mut(&connection) {
                    let delivered = chunks
                        .into_iter()
                        .map(ServerMessage::SubscriptionChunk)
                        .chain(std::iter::once(ServerMessage::InitialSubscription(last)))
                        .all(|message| session.sender.send(message).is_ok());
                    if !delivered {
                        debug!(connection = %connection, "session receiver dropped");
                    }
                    session.subscribed = Some(tables);
                }
                Ok(())
            }
            ClientMessage::CallReducer(call) => {
                if call.argument_len() > MAX_ARGUMENT_LEN {
                    return Err(ServerError::InvalidRequest(format!(
                        "{} argument of {} bytes exceeds {MAX_ARGUMENT_LEN}",
                        call.kind().as_str(),
                        call.argument_len()
                    )));
                }
                debug!(connection = %connection, reducer = call.kind().as_str(), "reducer call");
                let (update, event) = state.db.call(identity, call);
                state.broadcast(&update, &event);
                Ok(())
            }
        }
    }

    /// Closes a session and marks its user offline.
    pub fn disconnect(&self, connection: ConnectionId) -> ServerResult<()> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .remove(&connection)
            .ok_or_else(|| ServerError::UnknownConnection(connection.to_string()))?;

        let (update, event) = state.db.client_disconnected(session.identity);
        state.broadcast(&update, &event);
        info!(
            connection = %connection,
            identity = %session.identity.short_form(),
            "session closed"
        );
        Ok(())
    }
}

impl fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatServer")
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .finish()
    }
}
