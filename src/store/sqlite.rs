use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::{broadcast, mpsc};

use super::feed::{ChangeEvent, ChangeKind, ChannelSpec, Subscription};
use super::DataStore;
use crate::db::queries;
use crate::errors::StoreError;
use crate::models::{
    Booking, Message, NewBooking, NewMessage, SeenAtPatch, SeenScope, StatusPatch, User,
};

const FEED_CAPACITY: usize = 256;
const SUBSCRIPTION_BUFFER: usize = 64;

/// [`DataStore`] over a local SQLite database. Committed message writes are
/// published on a broadcast channel that stands in for the hosted change feed.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    feed: broadcast::Sender<ChangeEvent>,
    connected: AtomicBool,
    channels: Arc<Mutex<HashMap<String, usize>>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            db: Arc::new(Mutex::new(conn)),
            feed,
            connected: AtomicBool::new(false),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let db = self.conn()?;
        queries::save_user(&db, user)
    }

    /// Names of channels with at least one live subscription.
    pub fn active_channels(&self) -> Vec<String> {
        let channels = match self.channels.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = channels.keys().cloned().collect();
        names.sort();
        names
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    fn publish(&self, kind: ChangeKind, message: &Message) {
        let record = match serde_json::to_value(message) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, message_id = %message.id, "failed to encode change event");
                return;
            }
        };
        // No receivers is fine: nobody is watching this conversation.
        let _ = self.feed.send(ChangeEvent {
            table: "messages".to_string(),
            kind,
            record,
        });
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let db = self.conn()?;
        queries::create_booking(&db, &booking)
    }

    async fn bookings_for_provider(&self, provider_id: &str) -> Result<Vec<Booking>, StoreError> {
        let db = self.conn()?;
        queries::get_bookings_for_provider(&db, provider_id)
    }

    async fn update_booking(
        &self,
        booking_id: i64,
        provider_id: &str,
        patch: StatusPatch,
    ) -> Result<(), StoreError> {
        let db = self.conn()?;
        if queries::update_booking_status(&db, booking_id, provider_id, &patch)? {
            return Ok(());
        }

        match queries::get_booking_by_id(&db, booking_id)? {
            Some(current) if current.provider_id == provider_id => Err(StoreError::Conflict(format!(
                "booking {booking_id} is {}, cannot move to {}",
                current.status, patch.status
            ))),
            _ => Err(StoreError::NotFound(format!("booking {booking_id}"))),
        }
    }

    async fn user_name(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let db = self.conn()?;
        Ok(queries::get_user(&db, user_id)?.map(|u| u.name))
    }

    async fn conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let db = self.conn()?;
        queries::get_conversation(&db, a, b)
    }

    async fn messages_for_user(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let db = self.conn()?;
        queries::get_messages_for_user(&db, user_id)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let stored = {
            let db = self.conn()?;
            queries::insert_message(&db, &id, &message, &Utc::now())?
        };
        self.publish(ChangeKind::Insert, &stored);
        Ok(stored)
    }

    async fn mark_seen(&self, patch: SeenAtPatch, scope: SeenScope) -> Result<u64, StoreError> {
        let updated = {
            let db = self.conn()?;
            queries::mark_messages_seen(&db, &patch, &scope)?
        };
        for message in &updated {
            self.publish(ChangeKind::Update, message);
        }
        Ok(updated.len() as u64)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            tracing::info!("realtime feed connected");
        }
        Ok(())
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::Subscription(format!(
                "cannot join {}: realtime feed not connected",
                spec.name
            )));
        }

        // The broadcast receiver exists before we return, which is the
        // acknowledgment: nothing committed from here on is missed.
        let mut feed = self.feed.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = spec.name.clone();

        let forwarder = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        if spec.matches(&event) && tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %spec.name, skipped, "subscription lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        {
            let mut channels = self.channels.lock().map_err(|_| StoreError::Poisoned)?;
            *channels.entry(channel.clone()).or_insert(0) += 1;
        }
        tracing::debug!(channel = %channel, "subscribed");

        let channels = Arc::clone(&self.channels);
        let released = channel.clone();
        Ok(Subscription::new(channel, rx, move || {
            forwarder.abort();
            let mut channels = match channels.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(count) = channels.get_mut(&released) {
                *count -= 1;
                if *count == 0 {
                    channels.remove(&released);
                }
            }
            tracing::debug!(channel = %released, "subscription released");
        }))
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<(), StoreError> {
        tracing::debug!(channel = %subscription.channel(), "unsubscribing");
        drop(subscription);
        Ok(())
    }
}
