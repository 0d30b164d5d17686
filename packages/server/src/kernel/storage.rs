//! Object storage abstraction.
//!
//! The media garbage collector needs exactly one storage operation: a batch
//! delete of orphaned keys. The trait keeps that surface minimal so the GC
//! sweep can run against an in-memory double in tests.

use async_trait::async_trait;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("batch delete failed: {0}")]
    DeleteFailed(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the object-store operations the pipeline depends on.
#[async_trait]
pub trait BaseObjectStore: Send + Sync {
    /// Delete a batch of keys from a bucket in one call.
    ///
    /// The call must either delete every key or fail as a whole; callers
    /// rely on a returned error meaning "the keys may still exist".
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()>;
}

/// S3 implementation of `BaseObjectStore`.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a store from the ambient AWS environment (credentials chain,
    /// region, optional custom endpoint for S3-compatible providers).
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }
}

#[async_trait]
impl BaseObjectStore for S3ObjectStore {
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| {
                ObjectIdentifier::builder()
                    .key(key)
                    .build()
                    .map_err(|e| StorageError::InvalidKey(e.to_string()))
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        let errors = output.errors();
        if !errors.is_empty() {
            let first = errors[0]
                .message()
                .unwrap_or("unknown error")
                .to_string();
            return Err(StorageError::DeleteFailed(format!(
                "{} of {} keys failed, first error: {first}",
                errors.len(),
                keys.len(),
            )));
        }

        tracing::debug!(bucket, count = keys.len(), "Deleted objects from storage");
        Ok(())
    }
}
