use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::check_auth;
use crate::errors::AppError;
use crate::models::{ConversationSummary, Message};
use crate::services::chat::{self, ChatUpdate, ConversationSync};
use crate::services::inbox;
use crate::state::AppState;

const EVENT_BUFFER: usize = 32;

// GET /api/users/:user_id/conversations
pub async fn get_summaries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let summaries = inbox::conversation_summaries(state.store.as_ref(), &user_id).await?;
    Ok(Json(summaries))
}

// GET /api/users/:user_id/conversations/:peer_id
#[derive(Serialize)]
pub struct ConversationResponse {
    peer_id: String,
    peer_name: String,
    messages: Vec<Message>,
}

impl ConversationResponse {
    fn from_sync(peer_id: &str, sync: &ConversationSync) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            peer_name: sync.peer_name().to_string(),
            messages: sync.messages().to_vec(),
        }
    }
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((user_id, peer_id)): Path<(String, String)>,
) -> Result<Json<ConversationResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let mut sync = ConversationSync::new(Arc::clone(&state.store), &user_id);
    sync.open(&peer_id).await;
    let result = match sync.error() {
        Some(e) => Err(AppError::Upstream(e.to_string())),
        None => Ok(Json(ConversationResponse::from_sync(&peer_id, &sync))),
    };
    sync.close().await;
    result
}

// POST /api/users/:user_id/conversations/:peer_id/messages
#[derive(Deserialize)]
pub struct SendRequest {
    pub content: String,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((user_id, peer_id)): Path<(String, String)>,
    Json(body): Json<SendRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let message = chat::send_message(state.store.as_ref(), &user_id, &peer_id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

// POST /api/users/:user_id/conversations/:peer_id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((user_id, peer_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let marked = inbox::mark_conversation_read(state.store.as_ref(), &user_id, &peer_id).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

// GET /api/users/:user_id/conversations/:peer_id/events (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Path((user_id, peer_id)): Path<(String, String)>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers)
    if query.token.as_deref().unwrap_or("") != state.config.api_token {
        return Err(AppError::Unauthorized);
    }

    let mut sync = ConversationSync::new(Arc::clone(&state.store), &user_id);
    sync.open(&peer_id).await;
    if let Some(e) = sync.error() {
        return Err(AppError::Upstream(e.to_string()));
    }

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let snapshot = ConversationResponse::from_sync(&peer_id, &sync);
    tokio::spawn(async move {
        if tx.send(Ok(json_event("snapshot", &snapshot))).await.is_ok() {
            forward_updates(&mut sync, &tx).await;
        }
        sync.close().await;
        tracing::debug!(user_id = %user_id, peer_id = %peer_id, "event stream closed");
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );
    let merged = StreamExt::merge(ReceiverStream::new(rx), keepalive_stream);

    Ok(Sse::new(merged))
}

async fn forward_updates(sync: &mut ConversationSync, tx: &mpsc::Sender<Result<Event, Infallible>>) {
    loop {
        let update = tokio::select! {
            update = sync.next_update() => update,
            _ = tx.closed() => break,
        };

        let event = match update {
            Some(ChatUpdate::Inserted(message)) => json_event("insert", &message),
            Some(ChatUpdate::Updated(message)) => json_event("update", &message),
            Some(ChatUpdate::Duplicate | ChatUpdate::Ignored) => continue,
            None => break,
        };
        if tx.send(Ok(event)).await.is_err() {
            break;
        }
    }
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_default();
    Event::default().event(name).data(data)
}
