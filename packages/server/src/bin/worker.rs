// Main entry point for the background worker process: periodic jobs,
// stage consumers, and the notification dispatch loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::domains::content::{
    ContentScanWorker, EmbeddingConsumer, EmbeddingServiceConfig, ModerationConsumer,
    NsfwDetectionService, PgContentStore, QueuedEmbeddingService, TagGenerationService,
    TaggingConsumer,
};
use server_core::domains::content::consumers::spawn_stage_consumers;
use server_core::domains::media::{MediaGcWorker, PgMediaStore};
use server_core::domains::notifications::{
    NotificationDispatchWorker, NotificationFacade, PgNotificationStore,
};
use server_core::kernel::scheduled_tasks::start_scheduler;
use server_core::kernel::{
    NatsClientPublisher, OpenAIClient, RetryPolicy, S3ObjectStore, StreamHub,
};
use server_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Skillboard content-processing worker");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database connected, migrations applied");

    // Messaging
    let nats_client = async_nats::connect(config.nats_url.as_str())
        .await
        .context("Failed to connect to NATS")?;
    let publisher = Arc::new(NatsClientPublisher::new(nats_client.clone()));
    tracing::info!(url = %config.nats_url, "NATS connected");

    // AI providers
    let ai = Arc::new(OpenAIClient::new(
        config.openai_api_key.clone(),
        config.text_model.clone(),
    ));
    let retry = RetryPolicy::new(config.llm_retry_max_attempts, config.llm_retry_base_delay);

    // Stores
    let content_store = Arc::new(PgContentStore::new(pool.clone()));
    let media_store = Arc::new(PgMediaStore::new(pool.clone()));
    let notification_store = Arc::new(PgNotificationStore::new(pool.clone()));

    // Notification fan-out
    let stream_hub = StreamHub::new();
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    let facade = Arc::new(NotificationFacade::new(
        notification_store.clone(),
        notification_tx,
    ));
    let dispatch_worker = NotificationDispatchWorker::new(notification_rx, stream_hub.clone());
    let dispatch_handle = tokio::spawn(dispatch_worker.run());

    // Stage services and consumers
    let embedding_service = Arc::new(QueuedEmbeddingService::new(
        ai.clone(),
        EmbeddingServiceConfig {
            max_concurrent: config.embedding_max_concurrent,
            cache_capacity: config.embedding_cache_capacity,
            cache_ttl: config.embedding_cache_ttl,
        },
    ));
    let moderation = Arc::new(ModerationConsumer::new(
        content_store.clone(),
        NsfwDetectionService::new(ai.clone(), retry.clone()),
        config.moderation_thresholds,
        facade.clone(),
        publisher.clone(),
    ));
    let tagging = Arc::new(TaggingConsumer::new(
        content_store.clone(),
        TagGenerationService::new(ai.clone(), retry.clone()),
    ));
    let embedding = Arc::new(EmbeddingConsumer::new(
        content_store.clone(),
        embedding_service,
    ));

    let cancel = CancellationToken::new();
    let consumer_handles = spawn_stage_consumers(
        nats_client,
        moderation,
        tagging,
        embedding,
        cancel.clone(),
    )
    .await
    .context("Failed to start stage consumers")?;

    // Periodic jobs
    let scan_worker = Arc::new(ContentScanWorker::new(
        content_store.clone(),
        publisher.clone(),
    ));
    let objects = Arc::new(S3ObjectStore::from_env().await);
    let gc_worker = Arc::new(MediaGcWorker::new(
        media_store,
        objects,
        config.media_bucket.clone(),
        config.media_grant_grace,
    ));
    let mut scheduler = start_scheduler(
        &config,
        scan_worker,
        gc_worker,
        notification_store,
        cancel.clone(),
    )
    .await
    .context("Failed to start scheduler")?;

    tracing::info!("Worker running; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutting down");
    cancel.cancel();
    scheduler.shutdown().await.ok();

    for handle in consumer_handles {
        handle.await.ok();
    }
    // Consumers are gone, so every facade clone is dropped; the dispatch
    // worker drains the queue and exits.
    drop(facade);
    dispatch_handle.await.ok();

    tracing::info!("Worker stopped");
    Ok(())
}
