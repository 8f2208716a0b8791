//! TCP transport using length-prefixed CBOR frames.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;
use ripple_protocol::{read_frame, write_frame, ClientMessage, ConnectRequest, ServerMessage};
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A transport over one TCP connection.
///
/// A background thread decodes server frames into a channel so that
/// [`Transport::poll`] can wait with a timeout.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    incoming: Receiver<ClientResult<ServerMessage>>,
    reader: Option<JoinHandle<()>>,
    connected: bool,
}

impl TcpTransport {
    /// Opens a connection and sends the session-opening request.
    pub fn connect(config: &ClientConfig, token: Option<String>) -> ClientResult<Self> {
        let addr = resolve(&config.endpoint)?;
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|e| ClientError::Connection(format!("{}: {e}", config.endpoint)))?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");

        let mut transport = Self::from_stream(stream)?;
        transport.send(&ClientMessage::Connect(ConnectRequest::new(
            config.database.clone(),
            token,
        )))?;
        Ok(transport)
    }

    /// Wraps an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> ClientResult<Self> {
        let read_half = stream.try_clone()?;
        let (tx, rx) = mpsc::channel();

        let reader = thread::Builder::new()
            .name("ripple-client-reader".into())
            .spawn(move || {
                let mut input = BufReader::new(read_half);
                loop {
                    let next = match read_frame::<_, ServerMessage>(&mut input) {
                        Ok(Some(message)) => Ok(message),
                        Ok(None) => Err(ClientError::disconnected("server closed the connection")),
                        Err(e) => Err(ClientError::from(e)),
                    };
                    let done = next.is_err();
                    if tx.send(next).is_err() || done {
                        break;
                    }
                }
                trace!("reader thread exiting");
            })?;

        Ok(Self {
            stream,
            incoming: rx,
            reader: Some(reader),
            connected: true,
        })
    }
}

fn resolve(endpoint: &str) -> ClientResult<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .map_err(|e| ClientError::Connection(format!("{endpoint}: {e}")))?
        .next()
        .ok_or_else(|| ClientError::Connection(format!("{endpoint}: no address")))
}

impl Transport for TcpTransport {
    fn send(&mut self, message: &ClientMessage) -> ClientResult<()> {
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        write_frame(&mut self.stream, message)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> ClientResult<Option<ServerMessage>> {
        let next = if timeout.is_zero() {
            match self.incoming.try_recv() {
                Ok(next) => next,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(ClientError::NotConnected),
            }
        } else {
            match self.incoming.recv_timeout(timeout) {
                Ok(next) => next,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(ClientError::NotConnected),
            }
        };
        next.map(Some)
    }

    fn close(&mut self) -> ClientResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != std::io::ErrorKind::NotConnected {
                warn!(error = %e, "socket shutdown failed");
            }
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("reader thread panicked");
            }
        }
        debug!("transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
