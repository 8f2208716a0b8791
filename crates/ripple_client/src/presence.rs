//! Display names and presence notices.

use crate::store::ClientCache;
use ripple_protocol::{Identity, Message, User};

/// Shown when a message's sender has no user row.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Returns the user's name, or the short form of their identity if unnamed.
pub fn display_name(user: &User) -> String {
    match &user.name {
        Some(name) => name.clone(),
        None => user.identity.short_form(),
    }
}

/// Resolves a message sender against the current mirror.
pub fn sender_display(db: &ClientCache, sender: &Identity) -> String {
    db.find_user(sender)
        .map(display_name)
        .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
}

/// Formats a message as `<sender>: <text>`.
pub fn format_message(db: &ClientCache, message: &Message) -> String {
    format!("{}: {}", sender_display(db, &message.sender), message.text)
}

/// Notice for a user that is online when first seen.
pub fn online_notice(user: &User) -> Option<String> {
    user.online
        .then(|| format!("{} is online", display_name(user)))
}

/// Notice for a user row update, if it is one the chat reports.
///
/// Renames take precedence over presence transitions.
pub fn update_notice(old: &User, new: &User) -> Option<String> {
    if old.name != new.name {
        Some(format!("{} renamed to {}", display_name(old), display_name(new)))
    } else if !old.online && new.online {
        Some(format!("{} connected.", display_name(new)))
    } else if old.online && !new.online {
        Some(format!("{} disconnected.", display_name(new)))
    } else {
        None
    }
}
