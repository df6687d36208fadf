//! Live conversation between the signed-in user and one counterpart.
//!
//! Opening a conversation fetches the history, then joins a change-feed
//! channel shared by both participants. Live inserts are merged into the
//! history with a duplicate check, live updates replace entries in place,
//! and incoming messages are marked seen as they are shown.

pub mod thread;

use std::sync::Arc;

use crate::errors::{SendError, StoreError};
use crate::models::conversation::channel_name;
use crate::models::{Message, NewMessage, SeenAtPatch, SeenScope, UNKNOWN_PEER_NAME};
use crate::store::{ChangeEvent, ChangeFilter, ChangeKind, ChannelSpec, DataStore, Subscription};

pub use thread::{MessageThread, DEDUP_WINDOW_MS};

const MESSAGES_TABLE: &str = "messages";

/// Trims `content` and stores it as a message from `sender_id` to
/// `receiver_id`. Blank content is refused.
pub async fn send_message(
    store: &dyn DataStore,
    sender_id: &str,
    receiver_id: &str,
    content: &str,
) -> Result<Message, SendError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SendError::Empty);
    }

    let message = store
        .insert_message(NewMessage {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
        })
        .await?;
    tracing::debug!(message_id = %message.id, sender_id, receiver_id, "message sent");
    Ok(message)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    Inserted(Message),
    Updated(Message),
    Duplicate,
    Ignored,
}

pub struct ConversationSync {
    store: Arc<dyn DataStore>,
    self_id: String,
    peer_id: Option<String>,
    peer_name: String,
    thread: MessageThread,
    subscription: Option<Subscription>,
    loading: bool,
    error: Option<String>,
}

impl ConversationSync {
    pub fn new(store: Arc<dyn DataStore>, self_id: &str) -> Self {
        Self {
            store,
            self_id: self_id.to_string(),
            peer_id: None,
            peer_name: UNKNOWN_PEER_NAME.to_string(),
            thread: MessageThread::default(),
            subscription: None,
            loading: false,
            error: None,
        }
    }

    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn messages(&self) -> &[Message] {
        self.thread.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True while a live channel is held.
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn channel(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.channel())
    }

    /// Loads the conversation with `peer_id` and joins its live channel,
    /// leaving any previous conversation first. On failure the error is
    /// retained and no channel is held.
    pub async fn open(&mut self, peer_id: &str) {
        self.close().await;

        self.loading = true;
        self.error = None;
        self.thread = MessageThread::default();
        self.peer_id = Some(peer_id.to_string());
        self.peer_name = self.resolve_peer_name(peer_id).await;

        let result = self.join(peer_id).await;
        self.loading = false;

        if let Err(e) = result {
            tracing::error!(error = %e, self_id = %self.self_id, peer_id, "failed to open conversation");
            self.error = Some(format!("Failed to open conversation: {e}"));
            self.thread = MessageThread::default();
            self.subscription = None;
            self.peer_id = None;
            return;
        }

        tracing::info!(
            channel = self.channel().unwrap_or_default(),
            messages = self.thread.len(),
            "conversation opened"
        );
        self.mark_visible_seen();
    }

    async fn resolve_peer_name(&self, peer_id: &str) -> String {
        match self.store.user_name(peer_id).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                tracing::warn!(peer_id, "counterpart not found");
                UNKNOWN_PEER_NAME.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, peer_id, "counterpart lookup failed");
                UNKNOWN_PEER_NAME.to_string()
            }
        }
    }

    async fn join(&mut self, peer_id: &str) -> Result<(), StoreError> {
        if !self.store.is_connected() {
            self.store.connect().await?;
        }

        self.spawn_mark_seen(SeenScope::Conversation {
            sender_id: peer_id.to_string(),
            receiver_id: self.self_id.clone(),
        });

        let history = self.store.conversation(&self.self_id, peer_id).await?;
        self.thread = MessageThread::from_history(history);

        let spec = ChannelSpec {
            name: channel_name(&self.self_id, peer_id),
            filters: vec![
                ChangeFilter::new(MESSAGES_TABLE, ChangeKind::Insert, "sender_id", &self.self_id),
                ChangeFilter::new(MESSAGES_TABLE, ChangeKind::Insert, "sender_id", peer_id),
                ChangeFilter::new(MESSAGES_TABLE, ChangeKind::Update, "sender_id", &self.self_id),
                ChangeFilter::new(MESSAGES_TABLE, ChangeKind::Update, "sender_id", peer_id),
            ],
        };
        self.subscription = Some(self.store.subscribe(spec).await?);
        Ok(())
    }

    /// Waits for the next live event and applies it. Returns `None` when no
    /// channel is held or the feed has closed.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let event = self.subscription.as_mut()?.next_event().await?;
        Some(self.apply_event(event))
    }

    pub fn apply_event(&mut self, event: ChangeEvent) -> ChatUpdate {
        let Some(peer_id) = self.peer_id.clone() else {
            return ChatUpdate::Ignored;
        };
        if event.table != MESSAGES_TABLE {
            return ChatUpdate::Ignored;
        }

        let message: Message = match serde_json::from_value(event.record) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode message event");
                return ChatUpdate::Ignored;
            }
        };

        if !message.is_between(&self.self_id, &peer_id) {
            tracing::debug!(message_id = %message.id, "event for another conversation, ignoring");
            return ChatUpdate::Ignored;
        }

        match event.kind {
            ChangeKind::Insert => {
                if !self.thread.insert(message.clone()) {
                    return ChatUpdate::Duplicate;
                }
                if message.sender_id == peer_id && message.is_unseen_by(&self.self_id) {
                    self.spawn_mark_seen(SeenScope::Message {
                        id: message.id.clone(),
                        receiver_id: self.self_id.clone(),
                    });
                }
                ChatUpdate::Inserted(message)
            }
            ChangeKind::Update => match self.thread.update(message) {
                Some(updated) => ChatUpdate::Updated(updated.clone()),
                None => ChatUpdate::Ignored,
            },
        }
    }

    /// Marks every incoming message still unseen in the list.
    pub fn mark_visible_seen(&self) {
        let Some(peer_id) = self.peer_id.as_deref() else {
            return;
        };
        for id in self.thread.unseen_from(peer_id, &self.self_id) {
            self.spawn_mark_seen(SeenScope::Message {
                id,
                receiver_id: self.self_id.clone(),
            });
        }
    }

    /// Sends `content` to the open conversation. The message reaches the
    /// list through the live feed, not by a local append.
    pub async fn send(&self, content: &str) -> Option<Message> {
        let Some(peer_id) = self.peer_id.as_deref() else {
            tracing::warn!("send with no open conversation");
            return None;
        };
        match send_message(self.store.as_ref(), &self.self_id, peer_id, content).await {
            Ok(stored) => Some(stored),
            Err(SendError::Empty) => {
                tracing::warn!(peer_id, "refusing to send empty message");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, peer_id, "failed to send message");
                None
            }
        }
    }

    /// Leaves the live channel. Safe to call when nothing is open.
    pub async fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            let channel = subscription.channel().to_string();
            if let Err(e) = self.store.unsubscribe(subscription).await {
                tracing::warn!(error = %e, channel = %channel, "failed to unsubscribe");
            }
        }
    }

    fn spawn_mark_seen(&self, scope: SeenScope) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.mark_seen(SeenAtPatch::now(), scope).await {
                Ok(0) => {}
                Ok(marked) => tracing::debug!(marked, "messages marked seen"),
                Err(e) => tracing::warn!(error = %e, "failed to mark messages seen"),
            }
        });
    }
}
