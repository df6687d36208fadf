use serde::Serialize;

use super::Message;

pub const UNKNOWN_PEER_NAME: &str = "unknown";

/// One entry per counterpart in a user's conversation list. Derived from
/// the message set on every read, never stored.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationSummary {
    pub peer_id: String,
    pub peer_name: String,
    pub last_message: Message,
    pub unread_count: i64,
}

/// Channel shared by both participants regardless of who opens it first.
pub fn channel_name(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("chat_{lo}_{hi}")
}
