//! Notification entity and store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{NotificationId, ProfileId};

/// Read notifications older than this are bulk-deleted by the periodic
/// cleanup job.
pub const READ_RETENTION_DAYS: i64 = 30;

/// A persisted user notification. The same shape is broadcast to connected
/// clients after delivery.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: NotificationId,
    /// Profile that should receive the notification.
    pub recipient_id: ProfileId,
    /// Profile whose action triggered it.
    pub sender_id: ProfileId,
    /// Human-readable notification text.
    pub message: String,
    pub is_read: bool,
    /// Deep link opened when the notification is clicked.
    pub action_url: Option<String>,
    /// Sender avatar or content thumbnail.
    pub icon_url: Option<String>,
    /// Deep link opened when the icon is clicked.
    pub icon_action_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence operations for notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert one notification row.
    async fn insert(&self, notification: &Notification) -> Result<()>;

    /// Bulk-delete read notifications created before `cutoff`.
    /// Returns the number of rows deleted.
    async fn delete_read_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Postgres implementation of [`NotificationStore`].
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications
                 (id, recipient_id, sender_id, message, is_read, action_url,
                  icon_url, icon_action_url, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(notification.id)
        .bind(notification.recipient_id)
        .bind(notification.sender_id)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(&notification.action_url)
        .bind(&notification.icon_url)
        .bind(&notification.icon_action_url)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_read_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // Single set-based DELETE; avoids loading rows just to remove them.
        let result = sqlx::query(
            "DELETE FROM notifications WHERE is_read AND created_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
