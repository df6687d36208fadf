use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::errors::StoreError;
use crate::models::booking::partition;
use crate::models::{Booking, BookingAction, BookingStatus, StatusPatch};
use crate::store::DataStore;

/// What kind of failure the board is holding on to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The booking does not exist or belongs to another provider.
    NotFound,
    /// The booking has moved on from the status the action starts from.
    Conflict,
    Unavailable,
}

impl FailureKind {
    fn of(e: &StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => FailureKind::NotFound,
            StoreError::Conflict(_) => FailureKind::Conflict,
            _ => FailureKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone)]
struct BoardError {
    kind: FailureKind,
    message: String,
}

/// A provider's view of their bookings: today's confirmed appointments and
/// the requests still waiting on them. Remote failures are kept in `error`
/// and logged; nothing escapes as an `Err`.
pub struct BookingBoard {
    store: Arc<dyn DataStore>,
    timezone: Tz,
    confirmed: Vec<Booking>,
    pending: Vec<Booking>,
    loading: bool,
    error: Option<BoardError>,
}

impl BookingBoard {
    pub fn new(store: Arc<dyn DataStore>, timezone: Tz) -> Self {
        Self {
            store,
            timezone,
            confirmed: vec![],
            pending: vec![],
            loading: false,
            error: None,
        }
    }

    pub fn confirmed(&self) -> &[Booking] {
        &self.confirmed
    }

    pub fn pending(&self) -> &[Booking] {
        &self.pending
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Confirmed bookings whose start falls on the viewer's current date.
    pub fn todays_appointments(&self, now: DateTime<Utc>) -> Vec<&Booking> {
        let today = now.with_timezone(&self.timezone).date_naive();
        self.confirmed
            .iter()
            .filter(|b| b.starts_on(today, self.timezone))
            .collect()
    }

    pub async fn load_confirmed_bookings(&mut self, provider_id: &str) {
        if let Some(bookings) = self.fetch(provider_id).await {
            self.confirmed = partition(bookings).0;
        }
    }

    pub async fn load_pending_bookings(&mut self, provider_id: &str) {
        if let Some(bookings) = self.fetch(provider_id).await {
            self.pending = partition(bookings).1;
        }
    }

    /// Accepts a pending request. A booking that has left `pending` is
    /// left alone and reported as a conflict.
    pub async fn accept_task(&mut self, booking_id: i64, provider_id: &str) {
        let patch = StatusPatch::transition(&BookingStatus::Pending, BookingAction::Accept);
        if self.write_status(booking_id, provider_id, patch).await {
            self.load_confirmed_bookings(provider_id).await;
            self.load_pending_bookings(provider_id).await;
        }
    }

    pub async fn reject_task(&mut self, booking_id: i64, provider_id: &str) {
        let patch = StatusPatch::transition(&BookingStatus::Pending, BookingAction::Reject);
        if self.write_status(booking_id, provider_id, patch).await {
            self.load_confirmed_bookings(provider_id).await;
            self.load_pending_bookings(provider_id).await;
        }
    }

    /// Moves an accepted booking to `p-confirmed` and a customer-confirmed
    /// one to `completed`. Any other status is written back unchanged. The
    /// write only lands while the stored status still equals `current_status`.
    pub async fn complete_booking(
        &mut self,
        booking_id: i64,
        current_status: &BookingStatus,
        provider_id: &str,
    ) {
        let patch = StatusPatch::transition(current_status, BookingAction::Complete);
        if patch.is_noop() {
            tracing::debug!(booking_id, status = %current_status, "complete has no effect on this status");
        }
        if self.write_status(booking_id, provider_id, patch).await {
            self.load_confirmed_bookings(provider_id).await;
        }
    }

    async fn fetch(&mut self, provider_id: &str) -> Option<Vec<Booking>> {
        self.loading = true;
        let result = self.store.bookings_for_provider(provider_id).await;
        self.loading = false;

        match result {
            Ok(bookings) => {
                self.error = None;
                Some(bookings)
            }
            Err(e) => {
                tracing::error!(error = %e, provider_id, "failed to load bookings");
                self.error = Some(BoardError {
                    kind: FailureKind::of(&e),
                    message: format!("Failed to load bookings: {e}"),
                });
                None
            }
        }
    }

    async fn write_status(&mut self, booking_id: i64, provider_id: &str, patch: StatusPatch) -> bool {
        tracing::info!(booking_id, provider_id, status = %patch.status, "updating booking status");
        match self.store.update_booking(booking_id, provider_id, patch).await {
            Ok(()) => {
                self.error = None;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, booking_id, provider_id, "failed to update booking status");
                self.error = Some(BoardError {
                    kind: FailureKind::of(&e),
                    message: format!("Failed to update booking {booking_id}: {e}"),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::errors::StoreError;
    use crate::models::{Message, NewBooking, NewMessage, SeenAtPatch, SeenScope};
    use crate::store::{ChannelSpec, SqliteStore, Subscription};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(db::init_db(":memory:").unwrap()))
    }

    fn request(provider: &str, start: DateTime<Utc>) -> NewBooking {
        NewBooking {
            customer_id: "cust-1".to_string(),
            provider_id: provider.to_string(),
            description: "Deep clean".to_string(),
            location: "7 Oak Ave".to_string(),
            start_at: start,
            end_at: start + chrono::Duration::hours(3),
            service_name: "Cleaning".to_string(),
            workers: 2,
            custom_price: None,
            customer_name: Some("Alice".to_string()),
            customer_phone: None,
        }
    }

    async fn status_of(store: &SqliteStore, provider: &str, id: i64) -> BookingStatus {
        store
            .bookings_for_provider(provider)
            .await
            .unwrap()
            .into_iter()
            .find(|b| b.id == id)
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn test_accept_then_complete() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board.load_pending_bookings("prov-1").await;
        assert_eq!(board.pending().len(), 1);

        board.accept_task(booking.id, "prov-1").await;
        assert!(board.error().is_none());
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Accepted);
        assert!(board.pending().is_empty());
        assert_eq!(board.confirmed().len(), 1);

        board
            .complete_booking(booking.id, &BookingStatus::Accepted, "prov-1")
            .await;
        assert_eq!(
            status_of(&store, "prov-1", booking.id).await,
            BookingStatus::ProviderConfirmed
        );
        assert!(board.confirmed().is_empty());
    }

    #[tokio::test]
    async fn test_reject_is_terminal() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board.reject_task(booking.id, "prov-1").await;
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Cancelled);

        board
            .complete_booking(booking.id, &BookingStatus::Cancelled, "prov-1")
            .await;
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Cancelled);
        assert!(board.confirmed().is_empty());
        assert!(board.pending().is_empty());
        assert!(board.error().is_none());
    }

    #[tokio::test]
    async fn test_customer_confirmed_completes() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        store
            .update_booking(booking.id, "prov-1", StatusPatch::set(BookingStatus::CustomerConfirmed))
            .await
            .unwrap();

        let mut board = BookingBoard::new(store.clone(), Tz::UTC);
        board.load_confirmed_bookings("prov-1").await;
        assert_eq!(board.confirmed().len(), 1);

        board
            .complete_booking(booking.id, &BookingStatus::CustomerConfirmed, "prov-1")
            .await;
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_status_lands_in_no_bucket() {
        let store = store();
        let odd = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        store
            .update_booking(
                odd.id,
                "prov-1",
                StatusPatch::set(BookingStatus::Other("on-hold".to_string())),
            )
            .await
            .unwrap();
        store.create_booking(request("prov-1", Utc::now())).await.unwrap();

        let mut board = BookingBoard::new(store, Tz::UTC);
        board.load_confirmed_bookings("prov-1").await;
        board.load_pending_bookings("prov-1").await;

        assert!(board.confirmed().is_empty());
        assert_eq!(board.pending().len(), 1);
        assert!(board.pending().iter().all(|b| b.id != odd.id));
    }

    #[tokio::test]
    async fn test_todays_appointments_use_viewer_timezone() {
        let store = store();
        let tz = chrono_tz::America::New_York;
        // 2025-06-15 12:00 in New York
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 16, 0, 0).unwrap();

        // 03:30 UTC on the 16th is still the evening of the 15th in New York
        let late_evening = Utc.with_ymd_and_hms(2025, 6, 16, 3, 30, 0).unwrap();
        // 03:30 UTC on the 15th is still the 14th in New York
        let early_morning = Utc.with_ymd_and_hms(2025, 6, 15, 3, 30, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2025, 6, 16, 14, 0, 0).unwrap();

        let mut ids = vec![];
        for start in [late_evening, early_morning, tomorrow] {
            let b = store.create_booking(request("prov-1", start)).await.unwrap();
            store
                .update_booking(b.id, "prov-1", StatusPatch::set(BookingStatus::Accepted))
                .await
                .unwrap();
            ids.push(b.id);
        }

        let mut board = BookingBoard::new(store, tz);
        board.load_confirmed_bookings("prov-1").await;
        assert_eq!(board.confirmed().len(), 3);

        let today: Vec<i64> = board.todays_appointments(now).iter().map(|b| b.id).collect();
        assert_eq!(today.len(), 1);
        assert!(today.contains(&ids[0]));
    }

    struct FailingStore;

    #[async_trait]
    impl DataStore for FailingStore {
        async fn create_booking(&self, _booking: NewBooking) -> Result<Booking, StoreError> {
            Err(StoreError::Subscription("offline".to_string()))
        }
        async fn bookings_for_provider(&self, _provider_id: &str) -> Result<Vec<Booking>, StoreError> {
            Err(StoreError::Subscription("offline".to_string()))
        }
        async fn update_booking(
            &self,
            _id: i64,
            _provider_id: &str,
            _patch: StatusPatch,
        ) -> Result<(), StoreError> {
            Err(StoreError::Subscription("offline".to_string()))
        }
        async fn user_name(&self, _user_id: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        async fn conversation(&self, _a: &str, _b: &str) -> Result<Vec<Message>, StoreError> {
            Ok(vec![])
        }
        async fn messages_for_user(&self, _user_id: &str) -> Result<Vec<Message>, StoreError> {
            Ok(vec![])
        }
        async fn insert_message(&self, _message: NewMessage) -> Result<Message, StoreError> {
            Err(StoreError::Subscription("offline".to_string()))
        }
        async fn mark_seen(&self, _patch: SeenAtPatch, _scope: SeenScope) -> Result<u64, StoreError> {
            Ok(0)
        }
        fn is_connected(&self) -> bool {
            false
        }
        async fn connect(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, StoreError> {
            Err(StoreError::Subscription(spec.name))
        }
        async fn unsubscribe(&self, _subscription: Subscription) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_are_retained_not_raised() {
        let mut board = BookingBoard::new(Arc::new(FailingStore), Tz::UTC);

        board.load_pending_bookings("prov-1").await;
        assert!(board.error().unwrap().contains("Failed to load bookings"));
        assert!(!board.is_loading());

        board.accept_task(42, "prov-1").await;
        assert!(board.error().unwrap().contains("booking 42"));
        assert_eq!(board.failure(), Some(FailureKind::Unavailable));
        assert!(board.pending().is_empty());
    }

    #[tokio::test]
    async fn test_missing_booking_surfaces_error() {
        let mut board = BookingBoard::new(store(), Tz::UTC);
        board.reject_task(7, "prov-1").await;
        assert!(board.error().unwrap().contains("not found"));
        assert_eq!(board.failure(), Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_finished_bookings_cannot_be_reopened() {
        let store = store();
        let done = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        store
            .update_booking(done.id, "prov-1", StatusPatch::set(BookingStatus::Completed))
            .await
            .unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board.accept_task(done.id, "prov-1").await;
        assert_eq!(board.failure(), Some(FailureKind::Conflict));
        assert_eq!(status_of(&store, "prov-1", done.id).await, BookingStatus::Completed);

        board.reject_task(done.id, "prov-1").await;
        assert_eq!(board.failure(), Some(FailureKind::Conflict));
        assert_eq!(status_of(&store, "prov-1", done.id).await, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_rejected_booking_cannot_be_accepted() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board.reject_task(booking.id, "prov-1").await;
        assert!(board.error().is_none());

        board.accept_task(booking.id, "prov-1").await;
        assert!(board.error().unwrap().contains("cancelled"));
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_complete_with_stale_status_is_refused() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        store
            .update_booking(booking.id, "prov-1", StatusPatch::set(BookingStatus::Completed))
            .await
            .unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board
            .complete_booking(booking.id, &BookingStatus::Accepted, "prov-1")
            .await;
        assert_eq!(board.failure(), Some(FailureKind::Conflict));
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_other_providers_booking_is_untouched() {
        let store = store();
        let booking = store.create_booking(request("prov-1", Utc::now())).await.unwrap();
        let mut board = BookingBoard::new(store.clone(), Tz::UTC);

        board.accept_task(booking.id, "prov-2").await;
        assert_eq!(board.failure(), Some(FailureKind::NotFound));

        board
            .complete_booking(booking.id, &BookingStatus::Pending, "prov-2")
            .await;
        assert_eq!(board.failure(), Some(FailureKind::NotFound));
        assert_eq!(status_of(&store, "prov-1", booking.id).await, BookingStatus::Pending);
    }
}
