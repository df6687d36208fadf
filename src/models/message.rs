use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    /// True when the message travels between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    pub fn is_unseen_by(&self, user_id: &str) -> bool {
        self.receiver_id == user_id && self.seen_at.is_none()
    }

    /// The other participant from `user_id`'s point of view.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.sender_id == user_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// A message before the store has assigned its id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
}

/// The only partial update a message accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeenAtPatch {
    pub seen_at: DateTime<Utc>,
}

impl SeenAtPatch {
    pub fn now() -> Self {
        Self { seen_at: Utc::now() }
    }
}

/// Rows a [`SeenAtPatch`] applies to. Both scopes only touch rows whose
/// `seen_at` is still null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeenScope {
    Message { id: String, receiver_id: String },
    Conversation { sender_id: String, receiver_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_without_seen_at() {
        let json = r#"{
            "id": "m-1",
            "sender_id": "alice",
            "receiver_id": "bob",
            "content": "hi",
            "created_at": "2025-06-15T10:00:00.250Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.seen_at, None);
        assert!(msg.is_between("bob", "alice"));
        assert!(!msg.is_between("bob", "carol"));
        assert_eq!(msg.counterpart_of("bob"), "alice");
        assert!(msg.is_unseen_by("bob"));
        assert!(!msg.is_unseen_by("alice"));
    }
}
