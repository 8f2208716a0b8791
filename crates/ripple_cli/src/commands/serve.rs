//! Serve command implementation.

use ripple_server::{serve, ChatServer, ServerConfig};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Runs the server until the listener fails.
pub fn run(
    bind: SocketAddr,
    database: &str,
    secret: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::new(bind).with_database(database);
    if let Some(secret) = secret {
        config = config.with_secret(secret.into_bytes());
    }

    let listener = TcpListener::bind(config.bind_addr)?;
    let server = Arc::new(ChatServer::new(config));
    serve(server, listener)?;
    Ok(())
}
