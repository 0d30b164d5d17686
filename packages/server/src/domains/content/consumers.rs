//! Stage message consumers.
//!
//! Consumers run with at-least-once, possibly concurrent delivery: the scan
//! worker republishes every stage message each cycle until the item's flag
//! flips. Every handler therefore starts by re-reading the item and bails
//! out as a no-op when the work is already done — that idempotence is the
//! invariant the whole flag-based state machine rests on.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ModerationThresholds;
use crate::domains::content::embedding::{is_degraded, QueuedEmbeddingService};
use crate::domains::content::messages::{
    AcknowledgeProcessing, DetectInappropriateContent, EmbedContent, TagContent,
};
use crate::domains::content::models::{ContentKind, ContentState, ModerationReport, ModerationScores};
use crate::domains::content::moderation::NsfwDetectionService;
use crate::domains::content::store::ContentStore;
use crate::domains::content::tagging::TagGenerationService;
use crate::domains::notifications::NotificationFacade;
use crate::kernel::nats::{subjects, NatsPublisher};

/// True when any category score meets or exceeds its configured threshold.
pub fn exceeds_thresholds(scores: &ModerationScores, thresholds: &ModerationThresholds) -> bool {
    scores.toxicity >= thresholds.toxicity
        || scores.severe_toxicity >= thresholds.severe_toxicity
        || scores.obscene >= thresholds.obscene
        || scores.threat >= thresholds.threat
        || scores.insult >= thresholds.insult
        || scores.identity_attack >= thresholds.identity_attack
        || scores.sexual_explicit >= thresholds.sexual_explicit
}

const REMOVAL_REASON: &str = "The content does not follow our Community Guidelines.";

// =============================================================================
// Moderation
// =============================================================================

pub struct ModerationConsumer {
    store: Arc<dyn ContentStore>,
    detector: NsfwDetectionService,
    thresholds: ModerationThresholds,
    notifications: Arc<NotificationFacade>,
    publisher: Arc<dyn NatsPublisher>,
}

impl ModerationConsumer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        detector: NsfwDetectionService,
        thresholds: ModerationThresholds,
        notifications: Arc<NotificationFacade>,
        publisher: Arc<dyn NatsPublisher>,
    ) -> Self {
        Self {
            store,
            detector,
            thresholds,
            notifications,
            publisher,
        }
    }

    pub async fn handle(&self, message: &DetectInappropriateContent) -> Result<()> {
        let kind = ContentKind::from_is_job_posting(message.is_job_posting);
        tracing::debug!(item_id = %message.item_id, kind = %kind, "Moderating content");

        let Some(item) = self.store.find(kind, message.item_id).await? else {
            tracing::warn!(item_id = %message.item_id, "Item no longer exists, skipping moderation");
            return Ok(());
        };

        if item.state != ContentState::Pending {
            tracing::debug!(item_id = %item.id, state = ?item.state, "Item already moderated, no-op");
            return Ok(());
        }

        let scores = self
            .detector
            .detect(&format!("{} {}", message.title, message.content))
            .await?;

        let flagged = exceeds_thresholds(&scores, &self.thresholds);
        let reason = if flagged { REMOVAL_REASON } else { "No issues." };

        let report =
            ModerationReport::automated(kind, item.id, item.author_id, scores, flagged, reason);
        self.store.add_moderation_report(&report).await?;

        if flagged {
            tracing::warn!(item_id = %item.id, kind = %kind, "Content flagged as inappropriate, removing");
            self.store.mark_rejected(kind, item.id).await?;

            if let Err(err) = self
                .notifications
                .notify_content_removed(kind, item.author_id, REMOVAL_REASON)
                .await
            {
                tracing::error!(error = %err, item_id = %item.id, "Failed to notify author about removal");
            }
        } else {
            tracing::debug!(item_id = %item.id, "Content passed moderation");
            self.store.mark_safe(kind, item.id).await?;
        }

        self.publish_ack(!flagged).await;
        Ok(())
    }

    async fn publish_ack(&self, is_appropriate: bool) {
        let ack = AcknowledgeProcessing { is_appropriate };
        let payload = match serde_json::to_vec(&ack) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        if let Err(err) = self
            .publisher
            .publish(subjects::CONTENT_ACK.to_string(), Bytes::from(payload))
            .await
        {
            tracing::error!(error = %err, "Failed to publish moderation acknowledgement");
        }
    }
}

// =============================================================================
// Tagging
// =============================================================================

pub struct TaggingConsumer {
    store: Arc<dyn ContentStore>,
    tagger: TagGenerationService,
}

impl TaggingConsumer {
    pub fn new(store: Arc<dyn ContentStore>, tagger: TagGenerationService) -> Self {
        Self { store, tagger }
    }

    pub async fn handle(&self, message: &TagContent) -> Result<()> {
        let kind = ContentKind::from_is_job_posting(message.is_job_posting);
        tracing::debug!(item_id = %message.item_id, kind = %kind, "Tagging content");

        let Some(item) = self.store.find(kind, message.item_id).await? else {
            tracing::warn!(item_id = %message.item_id, "Item no longer exists, skipping tagging");
            return Ok(());
        };

        if item.state != ContentState::Cleared {
            tracing::debug!(item_id = %item.id, state = ?item.state, "Item not awaiting tags, no-op");
            return Ok(());
        }

        let existing = self.store.tags_for(kind, item.id).await?;
        let tags = self
            .tagger
            .generate_tags(&message.title, &message.content, &existing)
            .await?;

        self.store.mark_tagged(kind, item.id, &tags).await?;
        tracing::debug!(item_id = %item.id, count = tags.len(), "Content tagged");
        Ok(())
    }
}

// =============================================================================
// Embedding
// =============================================================================

pub struct EmbeddingConsumer {
    store: Arc<dyn ContentStore>,
    embeddings: Arc<QueuedEmbeddingService>,
}

impl EmbeddingConsumer {
    pub fn new(store: Arc<dyn ContentStore>, embeddings: Arc<QueuedEmbeddingService>) -> Self {
        Self { store, embeddings }
    }

    pub async fn handle(&self, message: &EmbedContent) -> Result<()> {
        let kind = ContentKind::from_is_job_posting(message.is_job_posting);
        tracing::debug!(item_id = %message.item_id, kind = %kind, "Generating content embedding");

        let Some(item) = self.store.find(kind, message.item_id).await? else {
            tracing::warn!(item_id = %message.item_id, "Item no longer exists, skipping embedding");
            return Ok(());
        };

        if item.embedding.is_some() {
            tracing::debug!(item_id = %item.id, "Item already embedded, no-op");
            return Ok(());
        }

        let vector = self
            .embeddings
            .generate(&format!("{} {}", message.title, message.content))
            .await?;

        if is_degraded(&vector) {
            // Generation failed upstream; leave the column NULL so the next
            // scan cycle retries.
            tracing::warn!(item_id = %item.id, "Embedding generation degraded, will retry next scan");
            return Ok(());
        }

        self.store.set_embedding(kind, item.id, vector).await?;
        tracing::debug!(item_id = %item.id, "Embedding stored");
        Ok(())
    }
}

// =============================================================================
// Subscription wiring
// =============================================================================

/// Subscribe the three stage consumers on a NATS connection and spawn their
/// consume loops. Loops exit on cancellation or when the subscription ends.
pub async fn spawn_stage_consumers(
    client: async_nats::Client,
    moderation: Arc<ModerationConsumer>,
    tagging: Arc<TaggingConsumer>,
    embedding: Arc<EmbeddingConsumer>,
    cancel: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();

    let sub = client.subscribe(subjects::CONTENT_MODERATE).await?;
    let consumer = moderation.clone();
    handles.push(tokio::spawn(consume_loop(
        sub,
        subjects::CONTENT_MODERATE,
        cancel.clone(),
        move |message: DetectInappropriateContent| {
            let consumer = consumer.clone();
            async move { consumer.handle(&message).await }
        },
    )));

    let sub = client.subscribe(subjects::CONTENT_TAG).await?;
    let consumer = tagging.clone();
    handles.push(tokio::spawn(consume_loop(
        sub,
        subjects::CONTENT_TAG,
        cancel.clone(),
        move |message: TagContent| {
            let consumer = consumer.clone();
            async move { consumer.handle(&message).await }
        },
    )));

    let sub = client.subscribe(subjects::CONTENT_EMBED).await?;
    let consumer = embedding.clone();
    handles.push(tokio::spawn(consume_loop(
        sub,
        subjects::CONTENT_EMBED,
        cancel.clone(),
        move |message: EmbedContent| {
            let consumer = consumer.clone();
            async move { consumer.handle(&message).await }
        },
    )));

    Ok(handles)
}

async fn consume_loop<M, H, Fut>(
    mut subscription: async_nats::Subscriber,
    subject: &'static str,
    cancel: CancellationToken,
    handler: H,
) where
    M: DeserializeOwned,
    H: Fn(M) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    tracing::info!(subject, "Stage consumer started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(subject, "Stage consumer cancelled");
                break;
            }
            maybe = subscription.next() => {
                let Some(delivery) = maybe else {
                    tracing::info!(subject, "Subscription ended, stage consumer exiting");
                    break;
                };
                let message: M = match serde_json::from_slice(&delivery.payload) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::error!(error = %err, subject, "Dropping undecodable stage message");
                        continue;
                    }
                };
                if let Err(err) = handler(message).await {
                    tracing::error!(error = %err, subject, "Stage handler failed; message will be republished next scan");
                }
            }
        }
    }
}
