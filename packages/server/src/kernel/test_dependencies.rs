// TestDependencies - mock implementations for testing
//
// Provides in-memory doubles for every trait seam the pipeline depends on,
// so the scan worker, stage consumers, embedding service, and GC sweep can
// be exercised without Postgres, NATS, OpenAI, or S3.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::common::{AttachmentId, GrantId};
use crate::domains::content::models::{
    ContentItem, ContentKind, ContentState, GeneratedTag, ModerationReport,
};
use crate::domains::content::store::ContentStore;
use crate::domains::media::models::{AttachmentScan, MediaGrant, MediaOwnerKind};
use crate::domains::media::store::MediaStore;
use crate::domains::notifications::models::{Notification, NotificationStore};
use crate::kernel::storage::{BaseObjectStore, StorageError, StorageResult};
use crate::kernel::{BaseEmbeddingModel, BaseTextModel};

// =============================================================================
// Stub text model
// =============================================================================

/// Text model double that replays canned responses in order.
pub struct StubTextModel {
    responses: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubTextModel {
    pub fn with_responses(responses: Vec<String>) -> Self {
        let mut queued = responses;
        queued.reverse(); // pop() from the back serves them in order
        Self {
            responses: Mutex::new(queued),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// (system, user) prompt pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl BaseTextModel for StubTextModel {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((system_prompt.to_string(), user_prompt.to_string()));

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .ok_or_else(|| anyhow::anyhow!("StubTextModel has no more responses"))
    }
}

// =============================================================================
// Counting embedding model
// =============================================================================

/// Embedding model double that counts calls, tracks the maximum number of
/// concurrent callers, and can be made to fail the first N calls.
pub struct CountingEmbeddingModel {
    dimensions: usize,
    delay: Duration,
    fail_remaining: AtomicU32,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrency: AtomicUsize,
}

impl CountingEmbeddingModel {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            delay: Duration::ZERO,
            fail_remaining: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrency: AtomicUsize::new(0),
        }
    }

    /// Hold each call open for `delay`, to make concurrency observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `n` calls before succeeding.
    pub fn failing_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously in-flight calls observed.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.load(Ordering::SeqCst)
    }

    /// Deterministic per-text vector so tests can compare results.
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let seed: u32 = text.bytes().fold(0u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(u32::from(b))
        });
        (0..self.dimensions)
            .map(|i| ((seed.wrapping_add(i as u32)) % 1000) as f32 / 1000.0)
            .collect()
    }
}

#[async_trait]
impl BaseEmbeddingModel for CountingEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrency.fetch_max(in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(anyhow::anyhow!("embedding backend unavailable (injected)"))
        } else {
            Ok(texts.iter().map(|t| self.vector_for(t)).collect())
        };

        self.current.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// =============================================================================
// In-memory content store
// =============================================================================

type ItemKey = (ContentKind, uuid::Uuid);

/// In-memory [`ContentStore`] with the same idempotence guarantees as the
/// Postgres implementation.
#[derive(Default)]
pub struct TestContentStore {
    items: Mutex<HashMap<ItemKey, ContentItem>>,
    tags: Mutex<HashMap<ItemKey, Vec<GeneratedTag>>>,
    reports: Mutex<Vec<ModerationReport>>,
    rejected: Mutex<Vec<ItemKey>>,
}

impl TestContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item.
    pub fn insert(&self, kind: ContentKind, item: ContentItem) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((kind, item.id), item);
    }

    /// Current snapshot of one item (None once rejected).
    pub fn item(&self, kind: ContentKind, id: uuid::Uuid) -> Option<ContentItem> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(kind, id))
            .cloned()
    }

    pub fn reports(&self) -> Vec<ModerationReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn rejected_items(&self) -> Vec<ItemKey> {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stored_tags(&self, kind: ContentKind, id: uuid::Uuid) -> Vec<GeneratedTag> {
        self.tags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(kind, id))
            .cloned()
            .unwrap_or_default()
    }

    fn select(&self, kind: ContentKind, filter: impl Fn(&ContentItem) -> bool) -> Vec<ContentItem> {
        let mut selected: Vec<ContentItem> = self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((k, _), item)| *k == kind && filter(item))
            .map(|(_, item)| item.clone())
            .collect();
        // Deterministic order, matching the SQL ORDER BY created_at.
        selected.sort_by_key(|item| (item.created_at, item.id));
        selected
    }
}

#[async_trait]
impl ContentStore for TestContentStore {
    async fn find(&self, kind: ContentKind, id: uuid::Uuid) -> Result<Option<ContentItem>> {
        Ok(self.item(kind, id))
    }

    async fn awaiting_moderation(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        Ok(self.select(kind, |item| item.state == ContentState::Pending))
    }

    async fn awaiting_tags(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        Ok(self.select(kind, |item| item.state == ContentState::Cleared))
    }

    async fn awaiting_embedding(&self, kind: ContentKind) -> Result<Vec<ContentItem>> {
        Ok(self.select(kind, |item| {
            item.state == ContentState::Processed && item.embedding.is_none()
        }))
    }

    async fn finish_processed(&self, kind: ContentKind) -> Result<u64> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut flipped = 0;
        for ((k, _), item) in items.iter_mut() {
            if *k == kind && item.state == ContentState::Tagged {
                item.state = ContentState::Processed;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn mark_safe(&self, kind: ContentKind, id: uuid::Uuid) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(&(kind, id)) {
            if item.state == ContentState::Pending {
                item.state = ContentState::Cleared;
            }
        }
        Ok(())
    }

    async fn mark_rejected(&self, kind: ContentKind, id: uuid::Uuid) -> Result<()> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(kind, id));
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, id));
        Ok(())
    }

    async fn mark_tagged(
        &self,
        kind: ContentKind,
        id: uuid::Uuid,
        tags: &[GeneratedTag],
    ) -> Result<()> {
        self.tags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((kind, id))
            .or_default()
            .extend(tags.iter().cloned());

        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(&(kind, id)) {
            if item.state == ContentState::Cleared {
                item.state = ContentState::Tagged;
            }
        }
        Ok(())
    }

    async fn set_embedding(
        &self,
        kind: ContentKind,
        id: uuid::Uuid,
        embedding: Vector,
    ) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = items.get_mut(&(kind, id)) {
            if item.embedding.is_none() {
                item.embedding = Some(embedding);
            }
        }
        Ok(())
    }

    async fn tags_for(&self, kind: ContentKind, id: uuid::Uuid) -> Result<Vec<String>> {
        Ok(self
            .stored_tags(kind, id)
            .into_iter()
            .map(|tag| tag.english_name)
            .collect())
    }

    async fn add_moderation_report(&self, report: &ModerationReport) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}

// =============================================================================
// In-memory notification store
// =============================================================================

#[derive(Default)]
pub struct TestNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl TestNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationStore for TestNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }

    async fn delete_read_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut notifications = self.notifications.lock().unwrap_or_else(|e| e.into_inner());
        let before = notifications.len();
        notifications.retain(|n| !(n.is_read && n.created_at < cutoff));
        Ok((before - notifications.len()) as u64)
    }
}

// =============================================================================
// In-memory media store
// =============================================================================

#[derive(Default)]
pub struct TestMediaStore {
    grants: Mutex<Vec<MediaGrant>>,
    attachments: Mutex<Vec<AttachmentScan>>,
    removed_attachments: Mutex<Vec<AttachmentId>>,
    removed_grants: Mutex<Vec<GrantId>>,
}

impl TestMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_grant(&self, grant: MediaGrant) {
        self.grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(grant);
    }

    pub fn add_attachment(&self, scan: AttachmentScan) {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(scan);
    }

    pub fn removed_attachments(&self) -> Vec<AttachmentId> {
        self.removed_attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn removed_grants(&self) -> Vec<GrantId> {
        self.removed_grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining_attachments(&self) -> usize {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn remaining_grants(&self) -> usize {
        self.grants.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl MediaStore for TestMediaStore {
    async fn expired_grants(&self, cutoff: DateTime<Utc>) -> Result<Vec<MediaGrant>> {
        Ok(self
            .grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|grant| grant.on_hold && grant.granted_at < cutoff)
            .cloned()
            .collect())
    }

    async fn scan_attachments(&self, kind: MediaOwnerKind) -> Result<Vec<AttachmentScan>> {
        Ok(self
            .attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|scan| {
                scan.attachment.owner_kind == kind && !scan.attachment.is_deleted
            })
            .cloned()
            .collect())
    }

    async fn remove(&self, attachments: &[AttachmentId], grants: &[GrantId]) -> Result<()> {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|scan| !attachments.contains(&scan.attachment.id));
        self.grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|grant| !grants.contains(&grant.id));

        self.removed_attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(attachments);
        self.removed_grants
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(grants);
        Ok(())
    }
}

// =============================================================================
// In-memory object store
// =============================================================================

/// Object store double recording every batch delete, with failure injection
/// for the GC ordering tests.
#[derive(Default)]
pub struct TestObjectStore {
    batches: Mutex<Vec<(String, Vec<String>)>>,
    fail_remaining: AtomicU32,
}

impl TestObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` delete calls.
    pub fn failing_times(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Every recorded (bucket, keys) batch.
    pub fn batches(&self) -> Vec<(String, Vec<String>)> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// All keys deleted across every batch.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flat_map(|(_, keys)| keys)
            .collect()
    }
}

#[async_trait]
impl BaseObjectStore for TestObjectStore {
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::DeleteFailed(
                "storage unavailable (injected)".to_string(),
            ));
        }

        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((bucket.to_string(), keys.to_vec()));
        Ok(())
    }
}
