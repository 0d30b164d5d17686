//! Media garbage collector.
//!
//! Mark-and-sweep over live attachment references, with a grace window for
//! in-flight uploads:
//!
//! 1. collect upload grants still on hold past the grace period;
//! 2. scan every attachment table, splitting keys into a retain set (owner
//!    alive) and a delete set (owner gone or soft-deleted);
//! 3. the final batch is delete-set keys plus expired grant keys, minus
//!    anything in the retain set — a key that is still referenced anywhere
//!    is never deleted, even if another row or grant also points at it;
//! 4. one batch delete against object storage, then the dead rows are
//!    removed in a single DB transaction.
//!
//! The storage delete comes first on purpose: if it fails, the rows stay,
//! and the next sweep retries. Removing rows first would lose track of keys
//! that still exist in storage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::domains::media::models::MediaOwnerKind;
use crate::domains::media::store::MediaStore;
use crate::kernel::storage::BaseObjectStore;

pub struct MediaGcWorker {
    store: Arc<dyn MediaStore>,
    objects: Arc<dyn BaseObjectStore>,
    bucket: String,
    grant_grace: Duration,
}

impl MediaGcWorker {
    pub fn new(
        store: Arc<dyn MediaStore>,
        objects: Arc<dyn BaseObjectStore>,
        bucket: String,
        grant_grace: Duration,
    ) -> Self {
        Self {
            store,
            objects,
            bucket,
            grant_grace,
        }
    }

    /// Run one sweep. Returns the number of keys deleted from storage.
    pub async fn run_sweep(&self, cancel: &CancellationToken) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.grant_grace)
                .context("grant grace period out of range")?;

        let expired_grants = self.store.expired_grants(cutoff).await?;

        let mut retain: HashSet<String> = HashSet::new();
        let mut doomed = Vec::new();

        for kind in MediaOwnerKind::ALL {
            if cancel.is_cancelled() {
                tracing::info!("Media GC sweep cancelled");
                return Ok(0);
            }
            for scan in self.store.scan_attachments(kind).await? {
                if scan.owner_alive {
                    retain.insert(scan.attachment.key);
                } else {
                    doomed.push(scan.attachment);
                }
            }
        }

        if doomed.is_empty() && expired_grants.is_empty() {
            tracing::debug!("Media GC sweep found nothing to collect");
            return Ok(0);
        }

        // Final batch: delete-set keys plus grant keys, never anything the
        // retain set still references (the key may have been legitimately
        // reused elsewhere).
        let mut seen = HashSet::new();
        let batch: Vec<String> = doomed
            .iter()
            .map(|attachment| attachment.key.clone())
            .chain(expired_grants.iter().map(|grant| grant.key.clone()))
            .filter(|key| !retain.contains(key))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        if !batch.is_empty() {
            self.objects
                .delete_objects(&self.bucket, &batch)
                .await
                .context("object storage batch delete failed; keeping DB rows for next sweep")?;
        }

        let attachment_ids: Vec<_> = doomed.iter().map(|a| a.id).collect();
        let grant_ids: Vec<_> = expired_grants.iter().map(|g| g.id).collect();
        self.store.remove(&attachment_ids, &grant_ids).await?;

        tracing::info!(
            deleted_keys = batch.len(),
            removed_attachments = attachment_ids.len(),
            reclaimed_grants = grant_ids.len(),
            "Media GC sweep completed"
        );
        Ok(batch.len())
    }
}
