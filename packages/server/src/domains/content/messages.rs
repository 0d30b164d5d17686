//! Stage message contracts for the content-processing pipeline.
//!
//! Plain serde records published to the message broker by the periodic scan
//! worker and consumed once by a stage consumer. Messages are ephemeral —
//! never persisted — and are republished on every scan cycle until the
//! corresponding state flag flips, so every consumer must treat a duplicate
//! as a safe no-op.

use serde::{Deserialize, Serialize};

use crate::common::{ContentId, ProfileId};
use crate::domains::content::models::{ContentItem, ContentKind};

/// Request to run the inappropriate-content detector on one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectInappropriateContent {
    pub item_id: ContentId,
    pub author_id: ProfileId,
    pub title: String,
    pub content: String,
    pub is_job_posting: bool,
}

/// Request to generate and translate tags for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagContent {
    pub item_id: ContentId,
    pub author_id: ProfileId,
    pub title: String,
    pub content: String,
    pub is_job_posting: bool,
}

/// Request to generate the embedding vector for one processed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedContent {
    pub item_id: ContentId,
    pub title: String,
    pub content: String,
    pub is_job_posting: bool,
}

/// Acknowledgement published after each moderation verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeProcessing {
    pub is_appropriate: bool,
}

impl DetectInappropriateContent {
    pub fn from_item(item: &ContentItem, kind: ContentKind) -> Self {
        Self {
            item_id: item.id,
            author_id: item.author_id,
            title: item.title.clone(),
            content: item.content.clone(),
            is_job_posting: kind.is_job_posting(),
        }
    }
}

impl TagContent {
    pub fn from_item(item: &ContentItem, kind: ContentKind) -> Self {
        Self {
            item_id: item.id,
            author_id: item.author_id,
            title: item.title.clone(),
            content: item.content.clone(),
            is_job_posting: kind.is_job_posting(),
        }
    }
}

impl EmbedContent {
    pub fn from_item(item: &ContentItem, kind: ContentKind) -> Self {
        Self {
            item_id: item.id,
            title: item.title.clone(),
            content: item.content.clone(),
            is_job_posting: kind.is_job_posting(),
        }
    }
}
