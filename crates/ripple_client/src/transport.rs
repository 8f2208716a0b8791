//! Transport layer abstraction for the client session.

use crate::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use ripple_protocol::{ClientMessage, ReducerCall, ServerMessage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A bidirectional, ordered message channel to the server.
///
/// Implementations deliver server messages in the order the server sent them.
pub trait Transport: Send {
    /// Sends one message.
    fn send(&mut self, message: &ClientMessage) -> ClientResult<()>;

    /// Waits up to `timeout` for the next server message.
    ///
    /// A zero timeout never blocks. Returns `Ok(None)` if nothing arrived in
    /// time, and an error once the session has ended.
    fn poll(&mut self, timeout: Duration) -> ClientResult<Option<ServerMessage>>;

    /// Closes the channel. Later sends fail with [`ClientError::NotConnected`].
    fn close(&mut self) -> ClientResult<()>;

    /// Checks if the channel is open.
    fn is_connected(&self) -> bool;

    /// Invokes a reducer on the server. Fire-and-forget: the outcome, if
    /// any, arrives later as a transaction update.
    fn call_reducer(&mut self, call: ReducerCall) -> ClientResult<()> {
        self.send(&ClientMessage::CallReducer(call))
    }
}

#[derive(Debug, Default)]
struct MockInner {
    incoming: Mutex<VecDeque<ClientResult<ServerMessage>>>,
    send_errors: Mutex<VecDeque<ClientError>>,
    sent: Mutex<Vec<ClientMessage>>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

/// A scripted transport for testing.
///
/// Clones share state, so a test can keep a handle while the connection owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    /// Creates an open transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a message for the client to receive.
    pub fn push_incoming(&self, message: ServerMessage) {
        self.inner.incoming.lock().push_back(Ok(message));
    }

    /// Queues an error for the client to receive.
    pub fn push_error(&self, error: ClientError) {
        self.inner.incoming.lock().push_back(Err(error));
    }

    /// Makes the next send fail with `error` instead of recording the message.
    pub fn push_send_error(&self, error: ClientError) {
        self.inner.send_errors.lock().push_back(error);
    }

    /// Messages the client has sent so far.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.inner.sent.lock().clone()
    }

    /// Number of times [`Transport::close`] was called.
    pub fn close_count(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, message: &ClientMessage) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if let Some(error) = self.inner.send_errors.lock().pop_front() {
            return Err(error);
        }
        self.inner.sent.lock().push(message.clone());
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> ClientResult<Option<ServerMessage>> {
        if let Some(next) = self.inner.incoming.lock().pop_front() {
            return next.map(Some);
        }
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        if !timeout.is_zero() {
            thread::sleep(timeout.min(Duration::from_millis(1)));
        }
        Ok(None)
    }

    fn close(&mut self) -> ClientResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }
}
