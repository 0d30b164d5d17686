//! NATS client abstraction for production and testing.
//!
//! Provides a trait-based NATS implementation that allows swapping between
//! real NATS connections and test mocks. The content pipeline publishes its
//! stage messages through `NatsPublisher`; consumers subscribe with the real
//! client in the worker binary.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::RwLock;

/// NATS subjects used by the content-processing pipeline.
pub mod subjects {
    /// Moderation requests for freshly created content.
    pub const CONTENT_MODERATE: &str = "content.moderate";
    /// Tagging requests for moderated content.
    pub const CONTENT_TAG: &str = "content.tag";
    /// Embedding requests for processed content.
    pub const CONTENT_EMBED: &str = "content.embed";
    /// Moderation verdict acknowledgements.
    pub const CONTENT_ACK: &str = "content.ack";
}

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Trait for NATS publish operations.
///
/// This allows swapping between real NATS and test mocks.
#[async_trait]
pub trait NatsPublisher: Send + Sync {
    /// Publish a message to a subject.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Real NATS client publisher.
pub struct NatsClientPublisher {
    client: async_nats::Client,
}

impl NatsClientPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NatsPublisher for NatsClientPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

/// Mock NATS client that tracks published messages for testing.
///
/// This allows tests to inspect what messages would have been published
/// to NATS without requiring a real connection. Individual subjects can be
/// made to fail to exercise per-item publish error handling.
#[derive(Default)]
pub struct TestNats {
    /// Messages published to subjects.
    published: RwLock<Vec<PublishedMessage>>,
    /// Subjects for which publishing should fail.
    failing_subjects: RwLock<HashSet<String>>,
}

impl TestNats {
    /// Create a new test NATS client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `subject` fail with an error.
    pub fn fail_subject(&self, subject: &str) {
        self.failing_subjects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.to_string());
    }

    /// Record a published message.
    pub fn record_publish(&self, subject: String, payload: Bytes) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
    }

    /// Get all published messages.
    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get published messages for a specific subject.
    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Check if any message was published to a subject.
    pub fn was_published_to(&self, subject: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|m| m.subject == subject)
    }

    /// Get the count of published messages.
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Get the count of messages published to a specific subject.
    pub fn publish_count_for(&self, subject: &str) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .count()
    }

    /// Clear all recorded messages.
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Deserialize every message published to a subject as JSON.
    pub fn json_messages_for_subject<T: serde::de::DeserializeOwned>(
        &self,
        subject: &str,
    ) -> Vec<T> {
        self.messages_for_subject(subject)
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }
}

#[async_trait]
impl NatsPublisher for TestNats {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        if self
            .failing_subjects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&subject)
        {
            anyhow::bail!("publish to {subject} failed (injected)");
        }
        self.record_publish(subject, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_retrieves_messages() {
        let nats = TestNats::new();

        nats.publish(
            subjects::CONTENT_MODERATE.to_string(),
            Bytes::from(r#"{"item_id":"123"}"#),
        )
        .await
        .unwrap();

        assert_eq!(nats.publish_count(), 1);
        assert!(nats.was_published_to(subjects::CONTENT_MODERATE));
        assert!(!nats.was_published_to(subjects::CONTENT_TAG));
    }

    #[tokio::test]
    async fn failing_subject_returns_error_and_records_nothing() {
        let nats = TestNats::new();
        nats.fail_subject(subjects::CONTENT_TAG);

        let result = nats
            .publish(subjects::CONTENT_TAG.to_string(), Bytes::new())
            .await;

        assert!(result.is_err());
        assert_eq!(nats.publish_count(), 0);
    }
}
