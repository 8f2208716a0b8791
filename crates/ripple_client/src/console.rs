//! Console rendering of chat events and line input.

use crate::callbacks::EventContext;
use crate::presence::{format_message, online_notice, update_notice};
use crate::queue::{Command, CommandQueue};
use crate::subscription::SubscriptionEngine;
use parking_lot::Mutex;
use ripple_protocol::{RowChange, TableChange};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Line-oriented output shared by all chat callbacks.
pub struct ChatPrinter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> ChatPrinter<W> {
    /// Wraps a writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Writes one line and flushes.
    pub fn line(&self, text: &str) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write chat output");
        }
    }

    /// Unwraps the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl ChatPrinter<io::Stdout> {
    /// Printer for standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

/// Registers the chat's console callbacks on an engine.
///
/// Presence notices come from user inserts and updates. Once the snapshot is
/// ready the backlog is printed in time order; after that, each new message
/// is printed as it arrives.
pub fn register_callbacks<W>(engine: &mut SubscriptionEngine, printer: Arc<ChatPrinter<W>>)
where
    W: Write + Send + 'static,
{
    let p = Arc::clone(&printer);
    engine.users().on_insert(move |_, user| {
        if let Some(notice) = online_notice(user) {
            p.line(&notice);
        }
    });

    let p = Arc::clone(&printer);
    engine.users().on_update(move |_, old, new| {
        if let Some(notice) = update_notice(old, new) {
            p.line(&notice);
        }
    });

    let p = Arc::clone(&printer);
    engine.on_snapshot_ready(move |ctx: &EventContext<'_>| {
        p.line("Connected");
        for message in ctx.db.messages_by_time() {
            p.line(&format_message(ctx.db, message));
        }
    });

    engine.on_live_change(move |ctx, change| {
        if let TableChange::Message(RowChange::Insert(message)) = change {
            printer.line(&format_message(ctx.db, message));
        }
    });
}

/// Reads commands line by line until end of input.
///
/// Returns the number of commands enqueued.
pub fn read_commands<R: BufRead>(input: R, queue: &CommandQueue) -> io::Result<usize> {
    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        queue.enqueue(Command::parse(&line));
        count += 1;
    }
    debug!(count, "input closed");
    Ok(count)
}
