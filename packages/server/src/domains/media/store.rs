//! Media store: the queries and the transactional removal the GC sweep
//! needs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::common::{AttachmentId, GrantId};
use crate::domains::media::models::{
    AttachmentScan, MediaAttachment, MediaGrant, MediaOwnerKind,
};

/// Persistence operations for the media garbage collector.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Grants still on hold whose `granted_at` is older than `cutoff` —
    /// abandoned presigned-upload permissions.
    async fn expired_grants(&self, cutoff: DateTime<Utc>) -> Result<Vec<MediaGrant>>;

    /// All non-deleted attachments of one owner kind, each joined to
    /// whether its owner is still alive.
    async fn scan_attachments(&self, kind: MediaOwnerKind) -> Result<Vec<AttachmentScan>>;

    /// Remove attachment and grant rows in a single transaction. Only
    /// called after the object-storage delete succeeded.
    async fn remove(&self, attachments: &[AttachmentId], grants: &[GrantId]) -> Result<()>;
}

/// Postgres implementation of [`MediaStore`].
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn attachment_from_row(row: &PgRow, kind: MediaOwnerKind) -> Result<AttachmentScan, sqlx::Error> {
    Ok(AttachmentScan {
        attachment: MediaAttachment {
            id: row.try_get("id")?,
            key: row.try_get("key")?,
            owner_kind: kind,
            owner_id: row.try_get("owner_id")?,
            is_deleted: row.try_get("is_deleted")?,
        },
        owner_alive: row.try_get("owner_alive")?,
    })
}

#[async_trait]
impl MediaStore for PgMediaStore {
    async fn expired_grants(&self, cutoff: DateTime<Utc>) -> Result<Vec<MediaGrant>> {
        let grants = sqlx::query_as::<_, MediaGrant>(
            "SELECT * FROM media_grants WHERE on_hold AND granted_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn scan_attachments(&self, kind: MediaOwnerKind) -> Result<Vec<AttachmentScan>> {
        // LEFT JOIN so attachments whose owner row vanished entirely still
        // come back, with owner_alive = FALSE.
        let query = format!(
            "SELECT m.id, m.key, m.owner_id, m.is_deleted,
                    (o.id IS NOT NULL AND o.deleted_at IS NULL) AS owner_alive
             FROM media_attachments m
             LEFT JOIN {} o ON o.id = m.owner_id
             WHERE m.owner_kind = $1 AND NOT m.is_deleted",
            kind.owner_table()
        );

        let rows = sqlx::query(&query)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| attachment_from_row(row, kind).map_err(Into::into))
            .collect()
    }

    async fn remove(&self, attachments: &[AttachmentId], grants: &[GrantId]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !attachments.is_empty() {
            sqlx::query("DELETE FROM media_attachments WHERE id = ANY($1)")
                .bind(attachments)
                .execute(&mut *tx)
                .await?;
        }

        if !grants.is_empty() {
            sqlx::query("DELETE FROM media_grants WHERE id = ANY($1)")
                .bind(grants)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
