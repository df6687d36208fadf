pub mod feed;
pub mod sqlite;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::{Booking, Message, NewBooking, NewMessage, SeenAtPatch, SeenScope, StatusPatch};

pub use feed::{ChangeEvent, ChangeFilter, ChangeKind, ChannelSpec, Subscription};
pub use sqlite::SqliteStore;

/// Everything the booking board and the conversation synchronizer need
/// from the backend: row queries, scoped single-column updates, inserts,
/// and a filtered change feed.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, StoreError>;

    async fn bookings_for_provider(&self, provider_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Fails with [`StoreError::NotFound`] when `provider_id` has no booking
    /// `booking_id`, and with [`StoreError::Conflict`] when the booking no
    /// longer holds `patch.expected`.
    async fn update_booking(
        &self,
        booking_id: i64,
        provider_id: &str,
        patch: StatusPatch,
    ) -> Result<(), StoreError>;

    async fn user_name(&self, user_id: &str) -> Result<Option<String>, StoreError>;

    /// Messages between `a` and `b` in either direction, oldest first.
    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError>;

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Returns how many rows changed. Rows already seen are left alone and
    /// are not an error.
    async fn mark_seen(&self, patch: SeenAtPatch, scope: SeenScope) -> Result<u64, StoreError>;

    fn is_connected(&self) -> bool;

    async fn connect(&self) -> Result<(), StoreError>;

    /// Resolves once the subscription is registered; events committed after
    /// that point are delivered.
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, StoreError>;

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), StoreError>;
}
