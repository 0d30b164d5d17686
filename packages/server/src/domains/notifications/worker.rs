//! Notification dispatch worker.
//!
//! The single consumer of the notification queue. Dequeues one notification
//! at a time, forever, and broadcasts it to the recipient's stream-hub topic
//! so connected clients receive it in real time. Delivery order follows
//! enqueue order because there is exactly one consumer. Per-item delivery
//! failures are logged and never stop the loop; when the queue closes the
//! worker drains what is left and exits.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::domains::notifications::models::Notification;
use crate::kernel::stream_hub::StreamHub;

pub struct NotificationDispatchWorker {
    queue: mpsc::UnboundedReceiver<Notification>,
    hub: StreamHub,
}

impl NotificationDispatchWorker {
    pub fn new(queue: mpsc::UnboundedReceiver<Notification>, hub: StreamHub) -> Self {
        Self { queue, hub }
    }

    /// Consume until the queue is closed and drained.
    pub async fn run(mut self) {
        tracing::info!("Notification dispatch worker started");

        while let Some(notification) = self.queue.recv().await {
            if let Err(err) = self.deliver(&notification).await {
                tracing::error!(
                    error = %err,
                    notification_id = %notification.id,
                    recipient_id = %notification.recipient_id,
                    "Failed to deliver notification"
                );
            }
        }

        tracing::info!("Notification queue closed; dispatch worker exiting");
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let topic = format!("notifications:{}", notification.recipient_id);
        let payload = serde_json::to_value(notification)?;
        self.hub.publish(&topic, payload).await;
        tracing::debug!(
            notification_id = %notification.id,
            topic,
            "Notification delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{NotificationId, ProfileId};
    use chrono::Utc;

    fn notification(recipient: ProfileId, message: &str) -> Notification {
        Notification {
            id: NotificationId::new(),
            recipient_id: recipient,
            sender_id: ProfileId::new(),
            message: message.to_string(),
            is_read: false,
            action_url: None,
            icon_url: None,
            icon_action_url: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order_and_drains_on_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = StreamHub::new();
        let recipient = ProfileId::new();
        let mut sub = hub.subscribe(&format!("notifications:{recipient}")).await;

        tx.send(notification(recipient, "first")).unwrap();
        tx.send(notification(recipient, "second")).unwrap();
        tx.send(notification(recipient, "third")).unwrap();
        drop(tx); // close the queue: worker must drain, then exit

        let worker = NotificationDispatchWorker::new(rx, hub.clone());
        worker.run().await;

        for expected in ["first", "second", "third"] {
            let value = sub.recv().await.unwrap();
            assert_eq!(value["message"], expected);
        }
    }
}
