//! Content store: set-filtered reads, per-row transitions, and the bulk
//! conditional flip the scan worker relies on.
//!
//! The trait keeps the pipeline testable against an in-memory double; the
//! Postgres implementation runs the same SQL over both content tables
//! (`posts`, `job_postings`), which share identical pipeline columns.

use anyhow::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;

use crate::common::{ContentId, TagId};
use crate::domains::content::models::{
    ContentItem, ContentKind, GeneratedTag, ModerationReport,
};

/// Persistence operations the content pipeline needs.
///
/// Per-row transitions are individually idempotent: each one is a
/// conditional UPDATE that only moves the flag forward, so redelivered
/// stage messages cannot regress state.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Load a single live item.
    async fn find(&self, kind: ContentKind, id: ContentId) -> Result<Option<ContentItem>>;

    /// Items awaiting moderation (`Pending`).
    async fn awaiting_moderation(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;

    /// Items awaiting tag generation (`Cleared`).
    async fn awaiting_tags(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;

    /// Processed items that still lack an embedding vector.
    async fn awaiting_embedding(&self, kind: ContentKind) -> Result<Vec<ContentItem>>;

    /// Bulk flip: mark every safe+tagged item processed without loading
    /// rows. Returns the number of rows updated.
    async fn finish_processed(&self, kind: ContentKind) -> Result<u64>;

    /// Moderation passed: `Pending → Cleared`.
    async fn mark_safe(&self, kind: ContentKind, id: ContentId) -> Result<()>;

    /// Moderation failed: soft-delete the item so it drops out of every
    /// scan query.
    async fn mark_rejected(&self, kind: ContentKind, id: ContentId) -> Result<()>;

    /// Persist generated tags and flip `Cleared → Tagged` in one
    /// transaction.
    async fn mark_tagged(
        &self,
        kind: ContentKind,
        id: ContentId,
        tags: &[GeneratedTag],
    ) -> Result<()>;

    /// Store the embedding vector. Never overwrites an existing vector.
    async fn set_embedding(&self, kind: ContentKind, id: ContentId, embedding: Vector)
        -> Result<()>;

    /// English names of the tags currently linked to an item.
    async fn tags_for(&self, kind: ContentKind, id: ContentId) -> Result<Vec<String>>;

    /// Persist the verdict of an automated moderation pass.
    async fn add_moderation_report(&self, report: &ModerationReport) -> Result<()>;
}

/// Postgres implementation of [`ContentStore`].
#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn find(&self, kind: ContentKind, id: ContentId) -> Result<Option<ContentItem>> {
        let query = format!(
            "SELECT * FROM {} WHERE id = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        let item = sqlx::query_as::<_, ContentItem>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    async fn awaiting_moderation(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let query = format!(
            "SELECT * FROM {}
             WHERE NOT is_processed AND NOT is_safe_content AND deleted_at IS NULL
             ORDER BY created_at",
            kind.table_name()
        );
        let items = sqlx::query_as::<_, ContentItem>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn awaiting_tags(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let query = format!(
            "SELECT * FROM {}
             WHERE NOT is_processed AND is_safe_content AND NOT is_tagged
               AND deleted_at IS NULL
             ORDER BY created_at",
            kind.table_name()
        );
        let items = sqlx::query_as::<_, ContentItem>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn awaiting_embedding(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        let query = format!(
            "SELECT * FROM {}
             WHERE is_processed AND embedding IS NULL AND deleted_at IS NULL
             ORDER BY created_at",
            kind.table_name()
        );
        let items = sqlx::query_as::<_, ContentItem>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn finish_processed(&self, kind: ContentKind) -> Result<u64> {
        let query = format!(
            "UPDATE {}
             SET is_processed = TRUE
             WHERE NOT is_processed AND is_safe_content AND is_tagged
               AND deleted_at IS NULL",
            kind.table_name()
        );
        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn mark_safe(&self, kind: ContentKind, id: ContentId) -> Result<()> {
        let query = format!(
            "UPDATE {}
             SET is_safe_content = TRUE
             WHERE id = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        sqlx::query(&query).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_rejected(&self, kind: ContentKind, id: ContentId) -> Result<()> {
        let query = format!(
            "UPDATE {}
             SET deleted_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
            kind.table_name()
        );
        sqlx::query(&query).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_tagged(
        &self,
        kind: ContentKind,
        id: ContentId,
        tags: &[GeneratedTag],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for tag in tags {
            let tag_id: TagId = sqlx::query_scalar(
                "INSERT INTO tags (id, english_name, arabic_name, description)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (english_name) DO UPDATE
                 SET arabic_name = EXCLUDED.arabic_name,
                     description = EXCLUDED.description
                 RETURNING id",
            )
            .bind(TagId::new())
            .bind(&tag.english_name)
            .bind(&tag.arabic_name)
            .bind(&tag.description)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO content_tags (content_kind, content_id, tag_id)
                 VALUES ($1, $2, $3)
                 ON CONFLICT DO NOTHING",
            )
            .bind(kind.as_str())
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        let query = format!(
            "UPDATE {}
             SET is_tagged = TRUE
             WHERE id = $1 AND is_safe_content AND NOT is_processed
               AND deleted_at IS NULL",
            kind.table_name()
        );
        sqlx::query(&query).bind(id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_embedding(
        &self,
        kind: ContentKind,
        id: ContentId,
        embedding: Vector,
    ) -> Result<()> {
        let query = format!(
            "UPDATE {}
             SET embedding = $2
             WHERE id = $1 AND embedding IS NULL AND deleted_at IS NULL",
            kind.table_name()
        );
        sqlx::query(&query)
            .bind(id)
            .bind(embedding)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn tags_for(&self, kind: ContentKind, id: ContentId) -> Result<Vec<String>> {
        let names = sqlx::query_scalar(
            "SELECT t.english_name
             FROM tags t
             JOIN content_tags ct ON ct.tag_id = t.id
             WHERE ct.content_kind = $1 AND ct.content_id = $2
             ORDER BY t.english_name",
        )
        .bind(kind.as_str())
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn add_moderation_report(&self, report: &ModerationReport) -> Result<()> {
        sqlx::query(
            "INSERT INTO moderation_reports
                 (id, content_kind, content_id, author_id, is_negative, reason,
                  is_resolved, toxicity, severe_toxicity, obscene, threat,
                  insult, identity_attack, sexual_explicit, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(report.id)
        .bind(report.content_kind.as_str())
        .bind(report.content_id)
        .bind(report.author_id)
        .bind(report.is_negative)
        .bind(&report.reason)
        .bind(report.is_resolved)
        .bind(report.scores.toxicity)
        .bind(report.scores.severe_toxicity)
        .bind(report.scores.obscene)
        .bind(report.scores.threat)
        .bind(report.scores.insult)
        .bind(report.scores.identity_attack)
        .bind(report.scores.sexual_explicit)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
