//! The content-processing pipeline: moderation, tagging, and embedding for
//! posts and job postings, coordinated by a flag state machine and a
//! periodic scan.

pub mod consumers;
pub mod embedding;
pub mod messages;
pub mod models;
pub mod moderation;
mod parse;
pub mod scan;
pub mod store;
pub mod tagging;

pub use consumers::{EmbeddingConsumer, ModerationConsumer, TaggingConsumer};
pub use embedding::{EmbeddingServiceConfig, QueuedEmbeddingService};
pub use models::{ContentItem, ContentKind, ContentState, GeneratedTag, ModerationScores};
pub use moderation::NsfwDetectionService;
pub use scan::ContentScanWorker;
pub use store::{ContentStore, PgContentStore};
pub use tagging::TagGenerationService;
