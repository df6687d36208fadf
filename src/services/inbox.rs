use std::collections::HashMap;

use crate::errors::StoreError;
use crate::models::{ConversationSummary, Message, SeenAtPatch, SeenScope, UNKNOWN_PEER_NAME};
use crate::store::DataStore;

/// One summary per counterpart, most recent activity first.
pub async fn conversation_summaries(
    store: &dyn DataStore,
    user_id: &str,
) -> Result<Vec<ConversationSummary>, StoreError> {
    let messages = store.messages_for_user(user_id).await?;
    let mut summaries = summarize(user_id, messages);

    for summary in &mut summaries {
        summary.peer_name = match store.user_name(&summary.peer_id).await {
            Ok(Some(name)) => name,
            Ok(None) => UNKNOWN_PEER_NAME.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, peer_id = %summary.peer_id, "counterpart lookup failed");
                UNKNOWN_PEER_NAME.to_string()
            }
        };
    }
    Ok(summaries)
}

/// Marks everything `peer_id` has sent to `user_id` as seen.
pub async fn mark_conversation_read(
    store: &dyn DataStore,
    user_id: &str,
    peer_id: &str,
) -> Result<u64, StoreError> {
    let marked = store
        .mark_seen(
            SeenAtPatch::now(),
            SeenScope::Conversation {
                sender_id: peer_id.to_string(),
                receiver_id: user_id.to_string(),
            },
        )
        .await?;
    tracing::info!(user_id, peer_id, marked, "conversation marked read");
    Ok(marked)
}

fn summarize(user_id: &str, messages: Vec<Message>) -> Vec<ConversationSummary> {
    let mut by_peer: HashMap<String, ConversationSummary> = HashMap::new();

    for message in messages {
        let peer_id = message.counterpart_of(user_id).to_string();
        let unread = i64::from(message.is_unseen_by(user_id));

        match by_peer.get_mut(&peer_id) {
            Some(summary) => {
                summary.unread_count += unread;
                if message.created_at >= summary.last_message.created_at {
                    summary.last_message = message;
                }
            }
            None => {
                by_peer.insert(
                    peer_id.clone(),
                    ConversationSummary {
                        peer_id,
                        peer_name: UNKNOWN_PEER_NAME.to_string(),
                        last_message: message,
                        unread_count: unread,
                    },
                );
            }
        }
    }

    let mut summaries: Vec<ConversationSummary> = by_peer.into_values().collect();
    summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    summaries
}
