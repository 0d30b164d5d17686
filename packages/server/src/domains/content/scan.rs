//! Periodic scan worker for the content-processing pipeline.
//!
//! Each run performs four independent set-based queries per content kind and
//! dispatches stage messages through the broker:
//!
//! 1. unmoderated items        → `content.moderate`
//! 2. moderated, untagged      → `content.tag`
//! 3. processed, no embedding  → `content.embed`
//! 4. safe + tagged            → bulk flip to processed (no rows loaded)
//!
//! The scan itself consumes nothing: messages are republished every cycle
//! until the consumer flips the item's flag, which is why every consumer is
//! idempotent. A failed publish is logged and skipped — one bad item never
//! aborts the rest of the scan, and the batch flip runs regardless.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::domains::content::messages::{DetectInappropriateContent, EmbedContent, TagContent};
use crate::domains::content::models::ContentKind;
use crate::domains::content::store::ContentStore;
use crate::kernel::nats::{subjects, NatsPublisher};

pub struct ContentScanWorker {
    store: Arc<dyn ContentStore>,
    publisher: Arc<dyn NatsPublisher>,
}

impl ContentScanWorker {
    pub fn new(store: Arc<dyn ContentStore>, publisher: Arc<dyn NatsPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Run one full scan over both content tables.
    pub async fn run_scan(&self, cancel: &CancellationToken) -> Result<()> {
        for kind in ContentKind::ALL {
            if cancel.is_cancelled() {
                tracing::info!("Content scan cancelled");
                return Ok(());
            }
            self.scan_kind(kind, cancel).await?;
        }
        Ok(())
    }

    async fn scan_kind(&self, kind: ContentKind, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(kind = %kind, "Starting content scan");

        for item in self.store.awaiting_moderation(kind).await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let message = DetectInappropriateContent::from_item(&item, kind);
            self.publish(subjects::CONTENT_MODERATE, item.id, &message)
                .await;
        }

        for item in self.store.awaiting_tags(kind).await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let message = TagContent::from_item(&item, kind);
            self.publish(subjects::CONTENT_TAG, item.id, &message).await;
        }

        for item in self.store.awaiting_embedding(kind).await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let message = EmbedContent::from_item(&item, kind);
            self.publish(subjects::CONTENT_EMBED, item.id, &message)
                .await;
        }

        let flipped = self.store.finish_processed(kind).await?;
        tracing::info!(kind = %kind, flipped, "Content scan completed");
        Ok(())
    }

    /// Publish one stage message; failures are logged per item and never
    /// abort the scan.
    async fn publish<M: Serialize>(&self, subject: &str, item_id: uuid::Uuid, message: &M) {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, subject, item_id = %item_id, "Failed to serialize stage message");
                return;
            }
        };

        if let Err(err) = self
            .publisher
            .publish(subject.to_string(), Bytes::from(payload))
            .await
        {
            tracing::error!(error = %err, subject, item_id = %item_id, "Failed to publish stage message");
        }
    }
}
