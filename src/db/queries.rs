use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{format_ts, parse_ts};
use crate::errors::StoreError;
use crate::models::{
    Booking, BookingStatus, Message, NewBooking, NewMessage, SeenAtPatch, SeenScope, StatusPatch,
    User,
};

const BOOKING_COLUMNS: &str = "id, customer_id, provider_id, description, location, start_at, end_at, \
     service_name, workers, custom_price, customer_name, customer_phone, status";

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, created_at, seen_at";

// ── Bookings ──

pub fn create_booking(conn: &Connection, booking: &NewBooking) -> Result<Booking, StoreError> {
    conn.execute(
        "INSERT INTO bookings (customer_id, provider_id, description, location, start_at, end_at,
                               service_name, workers, custom_price, customer_name, customer_phone, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            booking.customer_id,
            booking.provider_id,
            booking.description,
            booking.location,
            format_ts(&booking.start_at),
            format_ts(&booking.end_at),
            booking.service_name,
            booking.workers,
            booking.custom_price,
            booking.customer_name,
            booking.customer_phone,
            BookingStatus::Pending.as_str(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_booking_by_id(conn, id)?
        .ok_or_else(|| StoreError::NotFound(format!("booking {id} after insert")))
}

pub fn get_booking_by_id(conn: &Connection, id: i64) -> Result<Option<Booking>, StoreError> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_bookings_for_provider(
    conn: &Connection,
    provider_id: &str,
) -> Result<Vec<Booking>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE provider_id = ?1 ORDER BY start_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(params![provider_id], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Writes the patch to the provider's booking. Returns false when no row
/// matched, including when `patch.expected` no longer holds.
pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    provider_id: &str,
    patch: &StatusPatch,
) -> Result<bool, StoreError> {
    let expected = patch.expected.as_ref().map(|s| s.as_str());
    let count = conn.execute(
        "UPDATE bookings SET status = ?1
         WHERE id = ?2 AND provider_id = ?3 AND (?4 IS NULL OR status = ?4)",
        params![patch.status.as_str(), id, provider_id, expected],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> Result<Booking, StoreError> {
    let start_at: String = row.get(5)?;
    let end_at: String = row.get(6)?;
    let status: String = row.get(12)?;

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        provider_id: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        start_at: parse_ts(&start_at)?,
        end_at: parse_ts(&end_at)?,
        service_name: row.get(7)?,
        workers: row.get(8)?,
        custom_price: row.get(9)?,
        customer_name: row.get(10)?,
        customer_phone: row.get(11)?,
        status: BookingStatus::parse(&status),
    })
}

// ── Users ──

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, StoreError> {
    let result = conn.query_row(
        "SELECT id, name, role FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_user(conn: &Connection, user: &User) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO users (id, name, role) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, role = excluded.role",
        params![user.id, user.name, user.role],
    )?;
    Ok(())
}

// ── Messages ──

pub fn insert_message(
    conn: &Connection,
    id: &str,
    message: &NewMessage,
    created_at: &DateTime<Utc>,
) -> Result<Message, StoreError> {
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            message.sender_id,
            message.receiver_id,
            message.content,
            format_ts(created_at),
        ],
    )?;

    Ok(Message {
        id: id.to_string(),
        sender_id: message.sender_id.clone(),
        receiver_id: message.receiver_id.clone(),
        content: message.content.clone(),
        created_at: *created_at,
        seen_at: None,
    })
}

pub fn get_conversation(conn: &Connection, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(params![a, b], |row| Ok(parse_message_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

pub fn get_messages_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Message>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE sender_id = ?1 OR receiver_id = ?1
         ORDER BY created_at ASC"
    ))?;

    let rows = stmt.query_map(params![user_id], |row| Ok(parse_message_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

/// Applies `patch` to the unseen rows in `scope` and returns the rows it changed.
pub fn mark_messages_seen(
    conn: &Connection,
    patch: &SeenAtPatch,
    scope: &SeenScope,
) -> Result<Vec<Message>, StoreError> {
    let seen_at = format_ts(&patch.seen_at);
    let (filter, a, b) = match scope {
        SeenScope::Message { id, receiver_id } => ("id = ?2 AND receiver_id = ?3", id, receiver_id),
        SeenScope::Conversation {
            sender_id,
            receiver_id,
        } => ("sender_id = ?2 AND receiver_id = ?3", sender_id, receiver_id),
    };

    let mut stmt = conn.prepare(&format!(
        "UPDATE messages SET seen_at = ?1 WHERE {filter} AND seen_at IS NULL RETURNING {MESSAGE_COLUMNS}"
    ))?;

    let rows = stmt.query_map(params![seen_at, a, b], |row| Ok(parse_message_row(row)))?;

    let mut updated = vec![];
    for row in rows {
        updated.push(row??);
    }
    updated.sort_by(|x, y| x.created_at.cmp(&y.created_at));
    Ok(updated)
}

fn parse_message_row(row: &rusqlite::Row) -> Result<Message, StoreError> {
    let created_at: String = row.get(4)?;
    let seen_at: Option<String> = row.get(5)?;

    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_ts(&created_at)?,
        seen_at: seen_at.as_deref().map(parse_ts).transpose()?,
    })
}
