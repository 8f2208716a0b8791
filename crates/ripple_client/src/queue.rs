//! User commands and the thread-safe queue between input and event loop.

use parking_lot::Mutex;
use ripple_protocol::ReducerCall;
use std::collections::VecDeque;
use std::sync::Arc;

const NAME_PREFIX: &str = "/name ";

/// A user command waiting to be sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Change the caller's display name.
    SetName(String),
    /// Post a chat message.
    SendMessage(String),
}

impl Command {
    /// Parses one line of user input.
    ///
    /// Lines starting with `/name ` set the display name to the rest of the
    /// line; anything else, including empty lines, is sent as a message.
    pub fn parse(line: &str) -> Self {
        match line.strip_prefix(NAME_PREFIX) {
            Some(name) => Command::SetName(name.to_string()),
            None => Command::SendMessage(line.to_string()),
        }
    }

    /// Converts the command into the reducer call it stands for.
    pub fn into_reducer_call(self) -> ReducerCall {
        match self {
            Command::SetName(name) => ReducerCall::SetName { name },
            Command::SendMessage(text) => ReducerCall::SendMessage { text },
        }
    }
}

/// FIFO of pending commands shared between the input thread and the event loop.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<Command>>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn enqueue(&self, command: Command) {
        self.inner.lock().push_back(command);
    }

    /// Removes the oldest command, if any. Never blocks on an empty queue.
    pub fn try_dequeue(&self) -> Option<Command> {
        self.inner.lock().pop_front()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if no command is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn parse_name_command() {
        assert_eq!(Command::parse("/name Alice"), Command::SetName("Alice".into()));
        assert_eq!(Command::parse("/name "), Command::SetName(String::new()));
        assert_eq!(
            Command::parse("/name  two spaces"),
            Command::SetName(" two spaces".into())
        );
    }

    #[test]
    fn parse_message() {
        assert_eq!(Command::parse("hello"), Command::SendMessage("hello".into()));
        assert_eq!(Command::parse(""), Command::SendMessage(String::new()));
        assert_eq!(Command::parse("/name"), Command::SendMessage("/name".into()));
        assert_eq!(
            Command::parse("/nameless"),
            Command::SendMessage("/nameless".into())
        );
    }

    #[test]
    fn reducer_call_mapping() {
        assert_eq!(
            Command::SetName("Bob".into()).into_reducer_call(),
            ReducerCall::SetName { name: "Bob".into() }
        );
        assert_eq!(
            Command::SendMessage("hi".into()).into_reducer_call(),
            ReducerCall::SendMessage { text: "hi".into() }
        );
    }

    #[test]
    fn fifo_order() {
        let queue = CommandQueue::new();
        assert!(queue.try_dequeue().is_none());

        queue.enqueue(Command::parse("one"));
        queue.enqueue(Command::parse("/name two"));
        queue.enqueue(Command::parse("three"));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.try_dequeue(), Some(Command::SendMessage("one".into())));
        assert_eq!(queue.try_dequeue(), Some(Command::SetName("two".into())));
        assert_eq!(queue.try_dequeue(), Some(Command::SendMessage("three".into())));
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = CommandQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = queue.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        q.enqueue(Command::SendMessage(format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut drained = Vec::new();
        while let Some(cmd) = queue.try_dequeue() {
            drained.push(cmd);
        }
        assert_eq!(drained.len(), 400);

        // Per-producer order is preserved.
        for t in 0..4 {
            let prefix = format!("{t}-");
            let seq: Vec<usize> = drained
                .iter()
                .filter_map(|c| match c {
                    Command::SendMessage(s) => s.strip_prefix(&prefix)?.parse().ok(),
                    Command::SetName(_) => None,
                })
                .collect();
            assert_eq!(seq, (0..100).collect::<Vec<_>>());
        }
    }
}
