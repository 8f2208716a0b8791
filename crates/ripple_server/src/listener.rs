//! TCP front end: one reader thread and one writer thread per connection.

use crate::error::ServerResult;
use crate::server::{ChatServer, ConnectionId};
use ripple_protocol::{read_frame, write_frame, ClientMessage, ServerMessage};
use std::io::BufReader;
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// Accepts connections until the listener fails.
pub fn serve(server: Arc<ChatServer>, listener: TcpListener) -> ServerResult<()> {
    info!(addr = %listener.local_addr()?, database = %server.config().database, "listening");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let server = Arc::clone(&server);
        thread::Builder::new()
            .name("ripple-session".into())
            .spawn(move || {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".into());
                match handle_connection(&server, stream) {
                    Ok(()) => {}
                    Err(e) if e.is_server_error() => {
                        error!(%peer, error = %e, "connection failed");
                    }
                    Err(e) => warn!(%peer, error = %e, "connection ended with error"),
                }
            })?;
    }
    Ok(())
}

/// Runs one connection to completion.
fn handle_connection(server: &ChatServer, mut stream: TcpStream) -> ServerResult<()> {
    stream.set_nodelay(true)?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let request = match read_frame::<_, ClientMessage>(&mut reader)? {
        Some(ClientMessage::Connect(request)) => request,
        Some(other) => {
            debug!(?other, "first message was not a connect");
            reject(&mut stream, "expected connect".into())?;
            return Ok(());
        }
        None => return Ok(()),
    };

    let session = match server.connect(request) {
        Ok(session) => session,
        Err(e) if e.is_client_error() => {
            info!(error = %e, "connect rejected");
            reject(&mut stream, e.to_string())?;
            return Ok(());
        }
        Err(e) => {
            reject(&mut stream, "internal error".into())?;
            return Err(e);
        }
    };

    let connection = session.connection_id;
    let receiver = session.receiver;
    let mut write_half = stream.try_clone()?;
    let writer = thread::Builder::new()
        .name("ripple-session-writer".into())
        .spawn(move || {
            for message in receiver {
                if let Err(e) = write_frame(&mut write_half, &message) {
                    // Unblocks the reader, which then ends the session.
                    warn!(%connection, error = %e, "write failed, closing connection");
                    let _ = write_half.shutdown(Shutdown::Both);
                    break;
                }
            }
        })?;

    let result = read_loop(server, connection, &mut reader);

    // Dropping the session closes its channel, which ends the writer.
    let disconnected = server.disconnect(connection);
    let _ = stream.shutdown(Shutdown::Both);
    if writer.join().is_err() {
        warn!(%connection, "writer thread panicked");
    }
    result.and(disconnected)
}

fn read_loop(
    server: &ChatServer,
    connection: ConnectionId,
    reader: &mut BufReader<TcpStream>,
) -> ServerResult<()> {
    loop {
        let Some(message) = read_frame::<_, ClientMessage>(reader)? else {
            debug!(%connection, "peer closed");
            return Ok(());
        };
        match server.handle_message(connection, message) {
            Ok(()) => {}
            Err(e) if e.is_client_error() => warn!(%connection, error = %e, "bad request"),
            Err(e) => return Err(e),
        }
    }
}

fn reject(stream: &mut TcpStream, reason: String) -> ServerResult<()> {
    write_frame(stream, &ServerMessage::ConnectRejected { reason })?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}
