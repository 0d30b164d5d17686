//! End-to-end tests for the content-processing pipeline: the periodic scan,
//! the stage consumers, and the flag state machine they coordinate on.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::{harmless_scores_json, item, tags_json, toxic_scores_json};
use server_core::config::ModerationThresholds;
use server_core::domains::content::messages::{
    AcknowledgeProcessing, DetectInappropriateContent, EmbedContent, TagContent,
};
use server_core::domains::content::{
    ContentKind, ContentScanWorker, ContentState, EmbeddingConsumer, EmbeddingServiceConfig,
    ModerationConsumer, NsfwDetectionService, QueuedEmbeddingService, TagGenerationService,
    TaggingConsumer,
};
use server_core::domains::notifications::NotificationFacade;
use server_core::kernel::nats::subjects;
use server_core::kernel::test_dependencies::{
    CountingEmbeddingModel, StubTextModel, TestContentStore, TestNotificationStore,
};
use server_core::kernel::{RetryPolicy, TestNats};

fn retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1))
}

fn scan_worker(store: &Arc<TestContentStore>, nats: &Arc<TestNats>) -> ContentScanWorker {
    ContentScanWorker::new(store.clone(), nats.clone())
}

struct ModerationFixture {
    consumer: ModerationConsumer,
    store: Arc<TestContentStore>,
    nats: Arc<TestNats>,
    notifications: Arc<TestNotificationStore>,
    // Keeps the fan-out queue open for the duration of the test.
    _rx: mpsc::UnboundedReceiver<server_core::domains::notifications::Notification>,
}

fn moderation_fixture(responses: Vec<String>) -> ModerationFixture {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());
    let notifications = Arc::new(TestNotificationStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let facade = Arc::new(NotificationFacade::new(notifications.clone(), tx));

    let consumer = ModerationConsumer::new(
        store.clone(),
        NsfwDetectionService::new(Arc::new(StubTextModel::with_responses(responses)), retry()),
        ModerationThresholds::default(),
        facade,
        nats.clone(),
    );

    ModerationFixture {
        consumer,
        store,
        nats,
        notifications,
        _rx: rx,
    }
}

// =============================================================================
// Scan worker
// =============================================================================

#[tokio::test]
async fn scan_routes_items_to_their_stage_subjects() {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());

    let pending = item(ContentState::Pending, "needs moderation");
    let cleared = item(ContentState::Cleared, "needs tags");
    let processed = item(ContentState::Processed, "needs embedding");
    store.insert(ContentKind::Post, pending.clone());
    store.insert(ContentKind::Post, cleared.clone());
    store.insert(ContentKind::JobPosting, processed.clone());

    scan_worker(&store, &nats)
        .run_scan(&CancellationToken::new())
        .await
        .unwrap();

    let moderate: Vec<DetectInappropriateContent> =
        nats.json_messages_for_subject(subjects::CONTENT_MODERATE);
    assert_eq!(moderate.len(), 1);
    assert_eq!(moderate[0].item_id, pending.id);
    assert!(!moderate[0].is_job_posting);

    let tag: Vec<TagContent> = nats.json_messages_for_subject(subjects::CONTENT_TAG);
    assert_eq!(tag.len(), 1);
    assert_eq!(tag[0].item_id, cleared.id);

    let embed: Vec<EmbedContent> = nats.json_messages_for_subject(subjects::CONTENT_EMBED);
    assert_eq!(embed.len(), 1);
    assert_eq!(embed[0].item_id, processed.id);
    assert!(embed[0].is_job_posting);
}

#[tokio::test]
async fn rescanning_without_consumer_progress_republishes_identical_messages() {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());

    for i in 0..3 {
        store.insert(ContentKind::Post, item(ContentState::Pending, &format!("p{i}")));
    }
    store.insert(ContentKind::JobPosting, item(ContentState::Cleared, "j0"));

    let worker = scan_worker(&store, &nats);
    let cancel = CancellationToken::new();

    worker.run_scan(&cancel).await.unwrap();
    let first: Vec<(String, Vec<u8>)> = nats
        .published_messages()
        .into_iter()
        .map(|m| (m.subject, m.payload.to_vec()))
        .collect();

    nats.clear();
    worker.run_scan(&cancel).await.unwrap();
    let second: Vec<(String, Vec<u8>)> = nats
        .published_messages()
        .into_iter()
        .map(|m| (m.subject, m.payload.to_vec()))
        .collect();

    // The scan consumes nothing: both cycles publish the same message set.
    assert_eq!(first, second);
}

#[tokio::test]
async fn batch_flip_marks_every_tagged_item_processed_and_touches_nothing_else() {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());

    let mut tagged_ids = Vec::new();
    for i in 0..5 {
        let it = item(ContentState::Tagged, &format!("tagged {i}"));
        tagged_ids.push(it.id);
        store.insert(ContentKind::Post, it);
    }
    let untouched = item(ContentState::Pending, "still pending");
    store.insert(ContentKind::Post, untouched.clone());

    scan_worker(&store, &nats)
        .run_scan(&CancellationToken::new())
        .await
        .unwrap();

    for id in tagged_ids {
        let it = store.item(ContentKind::Post, id).unwrap();
        assert_eq!(it.state, ContentState::Processed);
        // Monotonicity: processed implies safe and tagged.
        assert!(it.state.is_safe_content() && it.state.is_tagged());
    }
    assert_eq!(
        store.item(ContentKind::Post, untouched.id).unwrap().state,
        ContentState::Pending
    );
}

#[tokio::test]
async fn publish_failure_skips_the_item_but_not_the_scan() {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());
    nats.fail_subject(subjects::CONTENT_MODERATE);

    store.insert(ContentKind::Post, item(ContentState::Pending, "unlucky"));
    store.insert(ContentKind::Post, item(ContentState::Cleared, "tag me"));
    let tagged = item(ContentState::Tagged, "flip me");
    store.insert(ContentKind::Post, tagged.clone());

    scan_worker(&store, &nats)
        .run_scan(&CancellationToken::new())
        .await
        .unwrap();

    // The failing moderation publish did not prevent the tag publish...
    assert_eq!(nats.publish_count_for(subjects::CONTENT_TAG), 1);
    // ...nor the batch flip.
    assert_eq!(
        store.item(ContentKind::Post, tagged.id).unwrap().state,
        ContentState::Processed
    );
}

// =============================================================================
// Moderation consumer
// =============================================================================

#[tokio::test]
async fn moderation_clears_harmless_content_and_acknowledges() {
    let fixture = moderation_fixture(vec![harmless_scores_json()]);
    let it = item(ContentState::Pending, "a friendly question");
    fixture.store.insert(ContentKind::Post, it.clone());

    fixture
        .consumer
        .handle(&DetectInappropriateContent::from_item(&it, ContentKind::Post))
        .await
        .unwrap();

    assert_eq!(
        fixture.store.item(ContentKind::Post, it.id).unwrap().state,
        ContentState::Cleared
    );

    let reports = fixture.store.reports();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].is_negative);

    let acks: Vec<AcknowledgeProcessing> =
        fixture.nats.json_messages_for_subject(subjects::CONTENT_ACK);
    assert_eq!(acks, vec![AcknowledgeProcessing { is_appropriate: true }]);
}

#[tokio::test]
async fn moderation_rejects_flagged_content_and_notifies_the_author() {
    let fixture = moderation_fixture(vec![toxic_scores_json()]);
    let it = item(ContentState::Pending, "something hostile");
    let author = it.author_id;
    fixture.store.insert(ContentKind::JobPosting, it.clone());

    fixture
        .consumer
        .handle(&DetectInappropriateContent::from_item(
            &it,
            ContentKind::JobPosting,
        ))
        .await
        .unwrap();

    // Soft-deleted: the item no longer appears in any scan query.
    assert!(fixture.store.item(ContentKind::JobPosting, it.id).is_none());
    assert_eq!(
        fixture.store.rejected_items(),
        vec![(ContentKind::JobPosting, it.id)]
    );

    let reports = fixture.store.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_negative);
    assert!(reports[0].is_resolved);

    let persisted = fixture.notifications.notifications();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].recipient_id, author);
    assert!(persisted[0].message.contains("job posting"));

    let acks: Vec<AcknowledgeProcessing> =
        fixture.nats.json_messages_for_subject(subjects::CONTENT_ACK);
    assert_eq!(acks, vec![AcknowledgeProcessing { is_appropriate: false }]);
}

#[tokio::test]
async fn moderating_an_already_moderated_item_is_a_noop() {
    // No stubbed responses: the consumer must not even call the model.
    let fixture = moderation_fixture(vec![]);
    let it = item(ContentState::Cleared, "already moderated");
    fixture.store.insert(ContentKind::Post, it.clone());

    fixture
        .consumer
        .handle(&DetectInappropriateContent::from_item(&it, ContentKind::Post))
        .await
        .unwrap();

    assert_eq!(
        fixture.store.item(ContentKind::Post, it.id).unwrap().state,
        ContentState::Cleared
    );
    assert!(fixture.store.reports().is_empty());
    assert_eq!(fixture.nats.publish_count(), 0);
}

// =============================================================================
// Tagging consumer
// =============================================================================

#[tokio::test]
async fn tagging_persists_tags_and_flips_state() {
    let store = Arc::new(TestContentStore::new());
    let consumer = TaggingConsumer::new(
        store.clone(),
        TagGenerationService::new(
            Arc::new(StubTextModel::with_responses(vec![tags_json()])),
            retry(),
        ),
    );

    let it = item(ContentState::Cleared, "remote web dev role");
    store.insert(ContentKind::Post, it.clone());

    consumer
        .handle(&TagContent::from_item(&it, ContentKind::Post))
        .await
        .unwrap();

    assert_eq!(
        store.item(ContentKind::Post, it.id).unwrap().state,
        ContentState::Tagged
    );
    let tags = store.stored_tags(ContentKind::Post, it.id);
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0].english_name, "web development");
}

#[tokio::test]
async fn tagging_an_already_tagged_item_is_a_noop() {
    let store = Arc::new(TestContentStore::new());
    // Empty stub: any model call would error the handler.
    let consumer = TaggingConsumer::new(
        store.clone(),
        TagGenerationService::new(Arc::new(StubTextModel::with_responses(vec![])), retry()),
    );

    let it = item(ContentState::Tagged, "done already");
    store.insert(ContentKind::Post, it.clone());

    consumer
        .handle(&TagContent::from_item(&it, ContentKind::Post))
        .await
        .unwrap();

    assert_eq!(
        store.item(ContentKind::Post, it.id).unwrap().state,
        ContentState::Tagged
    );
}

// =============================================================================
// Embedding consumer
// =============================================================================

fn embedding_consumer(
    store: &Arc<TestContentStore>,
    model: Arc<CountingEmbeddingModel>,
) -> EmbeddingConsumer {
    EmbeddingConsumer::new(
        store.clone(),
        Arc::new(QueuedEmbeddingService::new(
            model,
            EmbeddingServiceConfig::default(),
        )),
    )
}

#[tokio::test]
async fn embedding_consumer_stores_the_vector() {
    let store = Arc::new(TestContentStore::new());
    let model = Arc::new(CountingEmbeddingModel::new(4));
    let consumer = embedding_consumer(&store, model.clone());

    let it = item(ContentState::Processed, "processed item");
    store.insert(ContentKind::Post, it.clone());

    consumer
        .handle(&EmbedContent::from_item(&it, ContentKind::Post))
        .await
        .unwrap();

    let stored = store.item(ContentKind::Post, it.id).unwrap();
    assert!(stored.embedding.is_some());
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn degraded_embedding_is_not_persisted_so_the_item_is_retried() {
    let store = Arc::new(TestContentStore::new());
    let model = Arc::new(CountingEmbeddingModel::new(4).failing_times(1));
    let consumer = embedding_consumer(&store, model.clone());

    let it = item(ContentState::Processed, "flaky embed");
    store.insert(ContentKind::Post, it.clone());
    let message = EmbedContent::from_item(&it, ContentKind::Post);

    // First delivery: provider fails, service degrades, nothing persisted.
    consumer.handle(&message).await.unwrap();
    assert!(store.item(ContentKind::Post, it.id).unwrap().embedding.is_none());

    // Redelivery on the next scan cycle succeeds.
    consumer.handle(&message).await.unwrap();
    assert!(store.item(ContentKind::Post, it.id).unwrap().embedding.is_some());
}

// =============================================================================
// Full pipeline scenario
// =============================================================================

/// Walks one item through the whole pipeline the way the periodic scan
/// drives it: moderation, tagging, the batch flip, embedding, and finally a
/// quiet scan with nothing left to publish.
#[tokio::test]
async fn item_travels_the_full_pipeline_across_scan_cycles() {
    let store = Arc::new(TestContentStore::new());
    let nats = Arc::new(TestNats::new());
    let cancel = CancellationToken::new();
    let worker = scan_worker(&store, &nats);

    let notifications = Arc::new(TestNotificationStore::new());
    let (tx, _rx) = mpsc::unbounded_channel();
    let moderation = ModerationConsumer::new(
        store.clone(),
        NsfwDetectionService::new(
            Arc::new(StubTextModel::with_responses(vec![harmless_scores_json()])),
            retry(),
        ),
        ModerationThresholds::default(),
        Arc::new(NotificationFacade::new(notifications, tx)),
        nats.clone(),
    );
    let tagging = TaggingConsumer::new(
        store.clone(),
        TagGenerationService::new(
            Arc::new(StubTextModel::with_responses(vec![tags_json()])),
            retry(),
        ),
    );
    let embedding = embedding_consumer(&store, Arc::new(CountingEmbeddingModel::new(4)));

    let p1 = item(ContentState::Pending, "P1");
    store.insert(ContentKind::Post, p1.clone());

    // Scan 1: publishes the moderation request; consumer clears the item.
    worker.run_scan(&cancel).await.unwrap();
    let moderate: Vec<DetectInappropriateContent> =
        nats.json_messages_for_subject(subjects::CONTENT_MODERATE);
    assert_eq!(moderate.len(), 1);
    moderation.handle(&moderate[0]).await.unwrap();
    assert_eq!(
        store.item(ContentKind::Post, p1.id).unwrap().state,
        ContentState::Cleared
    );

    // Scan 2: publishes the tagging request; consumer tags the item.
    nats.clear();
    worker.run_scan(&cancel).await.unwrap();
    let tag: Vec<TagContent> = nats.json_messages_for_subject(subjects::CONTENT_TAG);
    assert_eq!(tag.len(), 1);
    tagging.handle(&tag[0]).await.unwrap();
    assert_eq!(
        store.item(ContentKind::Post, p1.id).unwrap().state,
        ContentState::Tagged
    );

    // Scan 3: batch flip to processed.
    nats.clear();
    worker.run_scan(&cancel).await.unwrap();
    assert_eq!(
        store.item(ContentKind::Post, p1.id).unwrap().state,
        ContentState::Processed
    );

    // Scan 4: publishes the embedding request; consumer stores the vector.
    nats.clear();
    worker.run_scan(&cancel).await.unwrap();
    let embed: Vec<EmbedContent> = nats.json_messages_for_subject(subjects::CONTENT_EMBED);
    assert_eq!(embed.len(), 1);
    embedding.handle(&embed[0]).await.unwrap();
    assert!(store.item(ContentKind::Post, p1.id).unwrap().embedding.is_some());

    // Scan 5: nothing left for P1.
    nats.clear();
    worker.run_scan(&cancel).await.unwrap();
    assert_eq!(nats.publish_count(), 0);
}
