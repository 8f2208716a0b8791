//! Configuration for the client.

use std::path::PathBuf;
use std::time::Duration;

/// Default server address.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:3000";

/// Default database name.
pub const DEFAULT_DATABASE: &str = "quickstart-chat";

/// Configuration for a client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (`host:port`).
    pub endpoint: String,
    /// Database name to attach to.
    pub database: String,
    /// Directory holding the persisted auth token.
    pub credentials_dir: PathBuf,
    /// Sleep between event loop iterations.
    pub poll_interval: Duration,
    /// How long to wait for the server to accept the session.
    pub connect_timeout: Duration,
    /// How long the initial snapshot may take once subscribed.
    pub subscribe_timeout: Duration,
}

impl ClientConfig {
    /// Creates a new client configuration.
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            credentials_dir: default_credentials_dir(),
            poll_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the credentials directory.
    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    /// Sets the event loop poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the snapshot deadline.
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Path of the token file inside the credentials directory.
    pub fn token_path(&self) -> PathBuf {
        self.credentials_dir.join("token")
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_DATABASE)
    }
}

/// `$HOME/.ripple_chat`, or `.ripple_chat` in the working directory.
fn default_credentials_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".ripple_chat")
}
