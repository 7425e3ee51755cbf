use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;
use tracing::{debug, info};

use super::live::LiveChannel;
use super::store as db;
use super::{Notification, NotificationIntent, NotifyError, Recipient, Subscription, SubscriptionKind};

/// Owns the notification database and the live channel.
#[derive(Debug)]
pub struct Emitter {
    conn: Mutex<Connection>,
    live: LiveChannel,
}

impl Emitter {
    pub fn open(path: &Path, live_capacity: usize) -> Result<Self, NotifyError> {
        let conn = db::open_connection(path)?;
        debug!(path = %path.display(), "opened notification database");
        Ok(Self {
            conn: Mutex::new(conn),
            live: LiveChannel::with_capacity(live_capacity),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn live(&self) -> &LiveChannel {
        &self.live
    }

    /// Persists intents in one transaction, then publishes the newly stored
    /// ones. Intents already persisted by an earlier drain are skipped.
    pub fn deliver(&self, intents: &[NotificationIntent]) -> Result<Vec<Notification>, NotifyError> {
        let stored = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let mut stored = Vec::with_capacity(intents.len());
            for intent in intents {
                if let Some(notification) = db::insert_notification(&tx, intent)? {
                    stored.push(notification);
                }
            }
            tx.commit()?;
            stored
        };

        if stored.len() < intents.len() {
            info!(
                skipped = intents.len() - stored.len(),
                "skipped notification intents already delivered"
            );
        }
        for notification in &stored {
            self.live.publish(notification);
        }
        Ok(stored)
    }

    pub fn subscribe(
        &self,
        subscriber: &Recipient,
        kind: SubscriptionKind,
        value: &str,
    ) -> Result<Option<Subscription>, NotifyError> {
        if value.trim().is_empty() {
            return Err(NotifyError::Invalid {
                field: "value",
                message: "subscription value must not be empty".to_string(),
            });
        }
        Ok(db::insert_subscription(&self.conn(), subscriber, kind, value)?)
    }

    pub fn unsubscribe(
        &self,
        subscriber: &Recipient,
        kind: SubscriptionKind,
        value: &str,
    ) -> Result<bool, NotifyError> {
        Ok(db::delete_subscription(&self.conn(), subscriber, kind, value)?)
    }

    pub fn all_subscriptions(&self) -> Result<Vec<Subscription>, NotifyError> {
        Ok(db::list_subscriptions(&self.conn())?)
    }

    pub fn subscriptions_for(&self, subscriber: &Recipient) -> Result<Vec<Subscription>, NotifyError> {
        Ok(db::subscriptions_for(&self.conn(), subscriber)?)
    }

    pub fn notifications_for(
        &self,
        recipient: &Recipient,
        unread_only: bool,
    ) -> Result<Vec<Notification>, NotifyError> {
        Ok(db::list_notifications(&self.conn(), recipient, unread_only)?)
    }

    pub fn mark_read(&self, id: i64) -> Result<Option<Notification>, NotifyError> {
        Ok(db::mark_read(&self.conn(), id)?)
    }

    pub fn mark_all_read(&self, recipient: &Recipient) -> Result<usize, NotifyError> {
        Ok(db::mark_all_read(&self.conn(), recipient)?)
    }
}
