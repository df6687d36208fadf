use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, NewBooking};
use crate::services::bookings::{BookingBoard, FailureKind};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BoardResponse {
    confirmed: Vec<Booking>,
    pending: Vec<Booking>,
    today: Vec<Booking>,
}

impl BoardResponse {
    fn from_board(board: &BookingBoard) -> Self {
        Self {
            confirmed: board.confirmed().to_vec(),
            pending: board.pending().to_vec(),
            today: board
                .todays_appointments(Utc::now())
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

fn board_for(state: &AppState) -> BookingBoard {
    BookingBoard::new(Arc::clone(&state.store), state.config.viewer_timezone)
}

fn check_board(board: &BookingBoard) -> Result<(), AppError> {
    let (Some(kind), Some(message)) = (board.failure(), board.error()) else {
        return Ok(());
    };
    let message = message.to_string();
    Err(match kind {
        FailureKind::NotFound => AppError::NotFound(message),
        FailureKind::Conflict => AppError::Conflict(message),
        FailureKind::Unavailable => AppError::Upstream(message),
    })
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    check_auth(&headers, &state.config.api_token)?;
    body.validate().map_err(AppError::Validation)?;

    let booking = state.store.create_booking(body).await?;
    tracing::info!(
        booking_id = booking.id,
        provider_id = %booking.provider_id,
        "booking created"
    );
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/providers/:provider_id/bookings
pub async fn get_board(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
) -> Result<Json<BoardResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let mut board = board_for(&state);
    board.load_confirmed_bookings(&provider_id).await;
    check_board(&board)?;
    board.load_pending_bookings(&provider_id).await;
    check_board(&board)?;

    Ok(Json(BoardResponse::from_board(&board)))
}

// POST /api/providers/:provider_id/bookings/:id/accept
pub async fn accept_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((provider_id, id)): Path<(String, i64)>,
) -> Result<Json<BoardResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let mut board = board_for(&state);
    board.accept_task(id, &provider_id).await;
    check_board(&board)?;

    Ok(Json(BoardResponse::from_board(&board)))
}

// POST /api/providers/:provider_id/bookings/:id/reject
pub async fn reject_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((provider_id, id)): Path<(String, i64)>,
) -> Result<Json<BoardResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let mut board = board_for(&state);
    board.reject_task(id, &provider_id).await;
    check_board(&board)?;

    Ok(Json(BoardResponse::from_board(&board)))
}

// POST /api/providers/:provider_id/bookings/:id/complete
#[derive(Deserialize)]
pub struct CompleteRequest {
    pub current_status: String,
}

pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((provider_id, id)): Path<(String, i64)>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<BoardResponse>, AppError> {
    check_auth(&headers, &state.config.api_token)?;

    let current = BookingStatus::parse(body.current_status.trim());
    let mut board = board_for(&state);
    board.complete_booking(id, &current, &provider_id).await;
    check_board(&board)?;
    board.load_pending_bookings(&provider_id).await;
    check_board(&board)?;

    Ok(Json(BoardResponse::from_board(&board)))
}
