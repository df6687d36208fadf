pub mod bookings;
pub mod conversations;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::errors::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bookings", post(bookings::create_booking))
        .route(
            "/api/providers/:provider_id/bookings",
            get(bookings::get_board),
        )
        .route(
            "/api/providers/:provider_id/bookings/:id/accept",
            post(bookings::accept_booking),
        )
        .route(
            "/api/providers/:provider_id/bookings/:id/reject",
            post(bookings::reject_booking),
        )
        .route(
            "/api/providers/:provider_id/bookings/:id/complete",
            post(bookings::complete_booking),
        )
        .route(
            "/api/users/:user_id/conversations",
            get(conversations::get_summaries),
        )
        .route(
            "/api/users/:user_id/conversations/:peer_id",
            get(conversations::get_conversation),
        )
        .route(
            "/api/users/:user_id/conversations/:peer_id/messages",
            post(conversations::send_message),
        )
        .route(
            "/api/users/:user_id/conversations/:peer_id/read",
            post(conversations::mark_read),
        )
        .route(
            "/api/users/:user_id/conversations/:peer_id/events",
            get(conversations::events_stream),
        )
        .with_state(state)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
