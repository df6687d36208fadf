use chrono::Duration;

use crate::models::Message;

/// Two messages with the same sender, receiver and content created closer
/// together than this are treated as one.
pub const DEDUP_WINDOW_MS: i64 = 2_000;

/// Time-ordered message list for one conversation.
#[derive(Debug, Default, Clone)]
pub struct MessageThread {
    messages: Vec<Message>,
}

impl MessageThread {
    /// Builds the thread from a bulk fetch, sorted oldest first whatever
    /// order the rows arrived in. Duplicates in the fetch collapse too.
    pub fn from_history(mut history: Vec<Message>) -> Self {
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut thread = Self::default();
        for message in history {
            thread.insert(message);
        }
        thread
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_duplicate(&self, incoming: &Message) -> bool {
        let window = Duration::milliseconds(DEDUP_WINDOW_MS);
        self.messages.iter().any(|m| {
            m.id == incoming.id
                || (m.content == incoming.content
                    && m.sender_id == incoming.sender_id
                    && m.receiver_id == incoming.receiver_id
                    && (m.created_at - incoming.created_at).abs() < window)
        })
    }

    /// Appends at the tail unless a matching message is already present.
    /// Live inserts are assumed to arrive in creation order; nothing is
    /// re-sorted here.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.is_duplicate(&message) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replaces the entry with the same id in place. A `seen_at` already
    /// recorded is never cleared or overwritten.
    pub fn update(&mut self, mut incoming: Message) -> Option<&Message> {
        let slot = self.messages.iter_mut().find(|m| m.id == incoming.id)?;
        if slot.seen_at.is_some() {
            incoming.seen_at = slot.seen_at;
        }
        *slot = incoming;
        Some(&*slot)
    }

    /// Ids of messages from `sender_id` to `receiver_id` that are still unseen.
    pub fn unseen_from(&self, sender_id: &str, receiver_id: &str) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.sender_id == sender_id && m.is_unseen_by(receiver_id))
            .map(|m| m.id.clone())
            .collect()
    }
}
