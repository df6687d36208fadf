//! Change-feed types shared by every [`DataStore`](super::DataStore).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A committed row change. The record is left as raw JSON; consumers
/// decode it into their own types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: serde_json::Value,
}

/// Table + kind + single-column equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub kind: ChangeKind,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn new(table: &str, kind: ChangeKind, column: &str, value: &str) -> Self {
        Self {
            table: table.to_string(),
            kind,
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && event.kind == self.kind
            && event.record.get(&self.column).and_then(|v| v.as_str()) == Some(self.value.as_str())
    }
}

/// A named channel carrying the union of its filters.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub filters: Vec<ChangeFilter>,
}

impl ChannelSpec {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }
}

/// A live channel. Dropping it releases the channel, so a subscription
/// cannot outlive its owner.
pub struct Subscription {
    channel: String,
    events: mpsc::Receiver<ChangeEvent>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        channel: String,
        events: mpsc::Receiver<ChangeEvent>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            channel,
            events,
            release: Some(Box::new(release)),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next matching event, or `None` once the feed has closed.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn insert(record: serde_json::Value) -> ChangeEvent {
        ChangeEvent {
            table: "messages".to_string(),
            kind: ChangeKind::Insert,
            record,
        }
    }

    #[test]
    fn test_filter_matches_table_kind_and_column() {
        let filter = ChangeFilter::new("messages", ChangeKind::Insert, "sender_id", "alice");

        assert!(filter.matches(&insert(json!({"sender_id": "alice"}))));
        assert!(!filter.matches(&insert(json!({"sender_id": "bob"}))));
        assert!(!filter.matches(&insert(json!({"receiver_id": "alice"}))));

        let mut update = insert(json!({"sender_id": "alice"}));
        update.kind = ChangeKind::Update;
        assert!(!filter.matches(&update));

        let mut other_table = insert(json!({"sender_id": "alice"}));
        other_table.table = "bookings".to_string();
        assert!(!filter.matches(&other_table));
    }

    #[test]
    fn test_channel_is_union_of_filters() {
        let spec = ChannelSpec {
            name: "chat_alice_bob".to_string(),
            filters: vec![
                ChangeFilter::new("messages", ChangeKind::Insert, "sender_id", "alice"),
                ChangeFilter::new("messages", ChangeKind::Insert, "sender_id", "bob"),
            ],
        };
        assert!(spec.matches(&insert(json!({"sender_id": "bob"}))));
        assert!(!spec.matches(&insert(json!({"sender_id": "carol"}))));
    }

    #[test]
    fn test_drop_runs_release_once() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let (_tx, rx) = mpsc::channel(1);

        let sub = Subscription::new("chat_a_b".to_string(), rx, move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
        });
        assert_eq!(sub.channel(), "chat_a_b");
        drop(sub);

        assert!(released.load(Ordering::SeqCst));
    }
}
