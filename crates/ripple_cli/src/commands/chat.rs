//! Chat command implementation.

use ripple_client::{
    read_commands, register_callbacks, ChatPrinter, ClientConfig, CommandQueue, CredentialStore,
    DbConnection, FileCredentialStore, ShutdownSignal, SubscriptionEngine, TcpTransport,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// Connects, then chats until stdin closes.
///
/// The event loop runs on its own thread; this thread only reads input.
pub fn run(
    server: &str,
    database: &str,
    credentials_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ClientConfig::new(server, database);
    if let Some(dir) = credentials_dir {
        config = config.with_credentials_dir(dir);
    }

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(config.token_path()));
    let token = credentials.load()?;
    let transport = TcpTransport::connect(&config, token)?;

    let mut engine = SubscriptionEngine::new();
    register_callbacks(&mut engine, Arc::new(ChatPrinter::stdout()));

    let mut conn = DbConnection::new(config, transport, engine, credentials);
    conn.connect()?;

    let queue = CommandQueue::new();
    let shutdown = ShutdownSignal::new();
    let event_loop = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("ripple-event-loop".into())
            .spawn(move || conn.run(&queue, &shutdown))?
    };

    let input = read_commands(io::stdin().lock(), &queue);
    debug!("stdin closed, shutting down");
    shutdown.trigger();

    let result = event_loop
        .join()
        .map_err(|_| "event loop thread panicked")?;
    input?;
    result?;
    Ok(())
}
