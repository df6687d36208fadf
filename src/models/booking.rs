use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub customer_id: String,
    pub provider_id: String,
    pub description: String,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub service_name: String,
    pub workers: i32,
    pub custom_price: Option<f64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub status: BookingStatus,
}

impl Booking {
    /// True when the booking starts on `date` as seen from `tz`.
    pub fn starts_on(&self, date: NaiveDate, tz: Tz) -> bool {
        self.start_at.with_timezone(&tz).date_naive() == date
    }
}

/// Customer-side booking request. The store assigns the id and the
/// initial `pending` status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub customer_id: String,
    pub provider_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub service_name: String,
    #[serde(default = "default_workers")]
    pub workers: i32,
    pub custom_price: Option<f64>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

fn default_workers() -> i32 {
    1
}

impl NewBooking {
    pub fn validate(&self) -> Result<(), String> {
        if self.customer_id.trim().is_empty() || self.provider_id.trim().is_empty() {
            return Err("customer_id and provider_id are required".to_string());
        }
        if self.service_name.trim().is_empty() {
            return Err("service_name is required".to_string());
        }
        if self.end_at <= self.start_at {
            return Err("end_at must be after start_at".to_string());
        }
        if self.workers < 1 {
            return Err("workers must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Cancelled,
    ProviderConfirmed,
    CustomerConfirmed,
    Completed,
    /// Anything the backend stores that this client does not recognise.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Accept,
    Reject,
    Complete,
}

impl BookingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::ProviderConfirmed => "p-confirmed",
            BookingStatus::CustomerConfirmed => "c-confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => BookingStatus::Pending,
            "accepted" => BookingStatus::Accepted,
            "cancelled" => BookingStatus::Cancelled,
            "p-confirmed" => BookingStatus::ProviderConfirmed,
            "c-confirmed" => BookingStatus::CustomerConfirmed,
            "completed" => BookingStatus::Completed,
            other => BookingStatus::Other(other.to_string()),
        }
    }

    /// Status reached by applying `action`. Pairs outside the lifecycle
    /// table leave the status unchanged, so nothing ever moves backward.
    pub fn next(&self, action: BookingAction) -> BookingStatus {
        match (self, action) {
            (BookingStatus::Pending, BookingAction::Accept) => BookingStatus::Accepted,
            (BookingStatus::Pending, BookingAction::Reject) => BookingStatus::Cancelled,
            (BookingStatus::Accepted, BookingAction::Complete) => BookingStatus::ProviderConfirmed,
            (BookingStatus::CustomerConfirmed, BookingAction::Complete) => BookingStatus::Completed,
            (current, _) => current.clone(),
        }
    }

    /// Upcoming or active appointments.
    pub fn is_confirmed_bucket(&self) -> bool {
        matches!(self, BookingStatus::Accepted | BookingStatus::CustomerConfirmed)
    }

    /// Requests waiting on the provider.
    pub fn is_pending_bucket(&self) -> bool {
        matches!(self, BookingStatus::Pending)
    }
}

impl From<String> for BookingStatus {
    fn from(s: String) -> Self {
        BookingStatus::parse(&s)
    }
}

impl From<BookingStatus> for String {
    fn from(status: BookingStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only partial update a booking accepts. When `expected` is set the
/// write only lands if the row still holds that status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPatch {
    pub status: BookingStatus,
    pub expected: Option<BookingStatus>,
}

impl StatusPatch {
    /// Unguarded write.
    pub fn set(status: BookingStatus) -> Self {
        Self {
            status,
            expected: None,
        }
    }

    /// Applies `action` to `from`, guarded on the row still being `from`.
    pub fn transition(from: &BookingStatus, action: BookingAction) -> Self {
        Self {
            status: from.next(action),
            expected: Some(from.clone()),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.expected.as_ref() == Some(&self.status)
    }
}

/// Splits bookings into (confirmed, pending). Everything else is dropped.
pub fn partition(bookings: Vec<Booking>) -> (Vec<Booking>, Vec<Booking>) {
    let mut confirmed = vec![];
    let mut pending = vec![];
    for booking in bookings {
        if booking.status.is_confirmed_bucket() {
            confirmed.push(booking);
        } else if booking.status.is_pending_bucket() {
            pending.push(booking);
        }
    }
    (confirmed, pending)
}
