//! Scheduled background jobs using tokio-cron-scheduler.
//!
//! Three periodic jobs: the content scan, the media GC sweep, and the
//! notification cleanup. Each job is self-mutually exclusive — a trigger
//! that fires while the previous run is still executing is discarded, not
//! queued. Jobs receive a cancellation token that is propagated into every
//! per-item operation, so shutdown stops new work promptly without rolling
//! back anything already published.
//!
//! The scheduler assumes a single worker instance owns these jobs; the
//! in-process guard is the whole mutual-exclusion story, which is why the
//! worker binary is deployed as exactly one replica.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::domains::content::scan::ContentScanWorker;
use crate::domains::media::gc::MediaGcWorker;
use crate::domains::notifications::models::NotificationStore;
use crate::domains::notifications::READ_RETENTION_DAYS;

/// Start all scheduled jobs.
pub async fn start_scheduler(
    config: &Config,
    scan_worker: Arc<ContentScanWorker>,
    gc_worker: Arc<MediaGcWorker>,
    notification_store: Arc<dyn NotificationStore>,
    cancel: CancellationToken,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Content scan - daily by default
    let scan_guard = Arc::new(Mutex::new(()));
    let scan_cancel = cancel.clone();
    let scan_job = Job::new_async(config.content_scan_cron.as_str(), move |_uuid, _lock| {
        let worker = scan_worker.clone();
        let guard = scan_guard.clone();
        let cancel = scan_cancel.clone();
        Box::pin(async move {
            let Ok(_running) = guard.try_lock() else {
                tracing::warn!("Content scan still running; discarding overlapping trigger");
                return;
            };
            if let Err(e) = worker.run_scan(&cancel).await {
                tracing::error!(error = %e, "Content scan failed");
            }
        })
    })?;
    scheduler.add(scan_job).await?;

    // Media GC sweep
    let gc_guard = Arc::new(Mutex::new(()));
    let gc_cancel = cancel.clone();
    let gc_job = Job::new_async(config.media_gc_cron.as_str(), move |_uuid, _lock| {
        let worker = gc_worker.clone();
        let guard = gc_guard.clone();
        let cancel = gc_cancel.clone();
        Box::pin(async move {
            let Ok(_running) = guard.try_lock() else {
                tracing::warn!("Media GC still running; discarding overlapping trigger");
                return;
            };
            if let Err(e) = worker.run_sweep(&cancel).await {
                tracing::error!(error = %e, "Media GC sweep failed");
            }
        })
    })?;
    scheduler.add(gc_job).await?;

    // Notification cleanup - bulk-delete read notifications older than the
    // retention window
    let cleanup_guard = Arc::new(Mutex::new(()));
    let cleanup_job = Job::new_async(
        config.notification_cleanup_cron.as_str(),
        move |_uuid, _lock| {
            let store = notification_store.clone();
            let guard = cleanup_guard.clone();
            Box::pin(async move {
                let Ok(_running) = guard.try_lock() else {
                    tracing::warn!(
                        "Notification cleanup still running; discarding overlapping trigger"
                    );
                    return;
                };
                let cutoff = Utc::now() - ChronoDuration::days(READ_RETENTION_DAYS);
                match store.delete_read_older_than(cutoff).await {
                    Ok(deleted) => tracing::info!(
                        deleted,
                        retention_days = READ_RETENTION_DAYS,
                        "Deleted old read notifications"
                    ),
                    Err(e) => tracing::error!(error = %e, "Notification cleanup failed"),
                }
            })
        },
    )?;
    scheduler.add(cleanup_job).await?;

    scheduler.start().await?;

    tracing::info!(
        content_scan = %config.content_scan_cron,
        media_gc = %config.media_gc_cron,
        notification_cleanup = %config.notification_cleanup_cron,
        "Scheduled jobs started"
    );
    Ok(scheduler)
}
