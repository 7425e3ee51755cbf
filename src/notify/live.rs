use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Notification, RecipientClass};

/// Flat message published for live transports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveMessage {
    pub recipient_class: RecipientClass,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_key: Option<String>,
    pub payload: Value,
}

impl LiveMessage {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            recipient_class: notification.recipient.class,
            recipient_key: notification.recipient.key.clone(),
            payload: json!({
                "notification_id": notification.id,
                "message": notification.message,
                "change_kind": notification.change_kind,
                "entity_type": notification.entity_type,
                "entity_id": notification.entity_id,
                "created_at": notification.created_at,
            }),
        }
    }
}

/// Best-effort broadcast of persisted notifications. Sending never blocks.
#[derive(Debug, Clone)]
pub struct LiveChannel {
    sender: broadcast::Sender<LiveMessage>,
}

impl LiveChannel {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns how many receivers got the message; zero is not an error.
    pub fn publish(&self, notification: &Notification) -> usize {
        let message = LiveMessage::from_notification(notification);
        match self.sender.send(message) {
            Ok(receivers) => {
                debug!(
                    notification_id = notification.id,
                    recipient = %notification.recipient,
                    receivers,
                    "live notification published"
                );
                receivers
            }
            Err(err) => {
                if self.sender.receiver_count() > 0 {
                    warn!(notification_id = notification.id, error = %err, "live notification dropped");
                } else {
                    debug!(notification_id = notification.id, "no live receivers");
                }
                0
            }
        }
    }
}
