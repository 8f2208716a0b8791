//! Server configuration.

use std::net::SocketAddr;

/// Default database name served.
pub const DEFAULT_DATABASE: &str = "quickstart-chat";

/// Configuration for the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Name of the hosted database. Connects naming another database are rejected.
    pub database: String,
    /// Maximum concurrent sessions.
    pub max_connections: usize,
    /// Secret for signing identity tokens. A random one is generated if unset.
    pub token_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            database: DEFAULT_DATABASE.to_string(),
            max_connections: 1000,
            token_secret: None,
        }
    }

    /// Sets the hosted database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the maximum concurrent sessions.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the token signing secret.
    pub fn with_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.token_secret = Some(secret.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3000)))
    }
}
