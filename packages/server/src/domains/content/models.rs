//! Content pipeline models.
//!
//! Posts and job postings share one in-memory shape (`ContentItem`) and one
//! processing state machine. The database keeps the historical boolean
//! columns (`is_safe_content`, `is_tagged`, `is_processed`) so existing data
//! and the scan predicates stay valid; the `ContentState` enum is decoded
//! from those flags at the store boundary and makes illegal combinations
//! unrepresentable in Rust code.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use thiserror::Error;

use crate::common::{ContentId, ProfileId, ReportId};

/// Which table a content item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Post,
    JobPosting,
}

impl ContentKind {
    /// Both kinds, in scan order.
    pub const ALL: [ContentKind; 2] = [ContentKind::Post, ContentKind::JobPosting];

    pub fn table_name(&self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::JobPosting => "job_postings",
        }
    }

    /// Discriminator value stored in polymorphic join tables and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::JobPosting => "job_posting",
        }
    }

    pub fn from_is_job_posting(is_job_posting: bool) -> Self {
        if is_job_posting {
            ContentKind::JobPosting
        } else {
            ContentKind::Post
        }
    }

    pub fn is_job_posting(&self) -> bool {
        matches!(self, ContentKind::JobPosting)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation+tagging progress of a content item.
///
/// Transitions are monotonic: `Pending → Cleared → Tagged → Processed`,
/// with `Rejected` as the terminal outcome of a failed moderation pass
/// (the row is soft-deleted at the same time, so rejected items drop out
/// of every scan query). Embedding progress is tracked independently by
/// `ContentItem::embedding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    /// Awaiting moderation.
    Pending,
    /// Moderation passed, awaiting tag generation.
    Cleared,
    /// Safe and tagged, awaiting the scan's batch flip.
    Tagged,
    /// Terminal for the moderation+tagging phase.
    Processed,
    /// Moderation failed; content removed.
    Rejected,
}

/// A flag combination that no legal state transition can produce
/// (e.g. processed but not tagged).
#[derive(Debug, Error)]
#[error(
    "illegal content state flags: is_safe_content={safe}, is_tagged={tagged}, is_processed={processed}"
)]
pub struct IllegalStateError {
    pub safe: bool,
    pub tagged: bool,
    pub processed: bool,
}

impl ContentState {
    /// Decode the state from the stored boolean columns.
    pub fn from_flags(safe: bool, tagged: bool, processed: bool) -> Result<Self, IllegalStateError> {
        match (safe, tagged, processed) {
            (false, false, false) => Ok(ContentState::Pending),
            (true, false, false) => Ok(ContentState::Cleared),
            (true, true, false) => Ok(ContentState::Tagged),
            (true, true, true) => Ok(ContentState::Processed),
            (safe, tagged, processed) => Err(IllegalStateError {
                safe,
                tagged,
                processed,
            }),
        }
    }

    pub fn is_safe_content(&self) -> bool {
        matches!(
            self,
            ContentState::Cleared | ContentState::Tagged | ContentState::Processed
        )
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, ContentState::Tagged | ContentState::Processed)
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, ContentState::Processed)
    }
}

/// The shape shared by posts and job postings as they move through the
/// processing pipeline.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: ContentId,
    pub author_id: ProfileId,
    pub title: String,
    pub content: String,
    pub state: ContentState,
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, PgRow> for ContentItem {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let safe: bool = row.try_get("is_safe_content")?;
        let tagged: bool = row.try_get("is_tagged")?;
        let processed: bool = row.try_get("is_processed")?;
        let state = ContentState::from_flags(safe, tagged, processed).map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "is_processed".into(),
                source: Box::new(e),
            }
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            author_id: row.try_get("author_id")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            state,
            embedding: row.try_get("embedding")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Per-category probabilities returned by the moderation stage service.
/// All values are in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModerationScores {
    #[serde(alias = "Toxicity")]
    pub toxicity: f32,
    #[serde(alias = "SevereToxicity", alias = "severeToxicity")]
    pub severe_toxicity: f32,
    #[serde(alias = "Obscene")]
    pub obscene: f32,
    #[serde(alias = "Threat")]
    pub threat: f32,
    #[serde(alias = "Insult")]
    pub insult: f32,
    #[serde(alias = "IdentityAttack", alias = "identityAttack")]
    pub identity_attack: f32,
    #[serde(alias = "SexualExplicit", alias = "sexualExplicit")]
    pub sexual_explicit: f32,
}

/// Persisted verdict of an automated moderation pass.
#[derive(Debug, Clone)]
pub struct ModerationReport {
    pub id: ReportId,
    pub content_kind: ContentKind,
    pub content_id: ContentId,
    pub author_id: ProfileId,
    /// True when the content was found inappropriate.
    pub is_negative: bool,
    pub reason: String,
    /// Automated reports are born resolved; only user-filed reports need
    /// admin review.
    pub is_resolved: bool,
    pub scores: ModerationScores,
    pub created_at: DateTime<Utc>,
}

impl ModerationReport {
    /// Build the report for one automated moderation pass.
    pub fn automated(
        kind: ContentKind,
        content_id: ContentId,
        author_id: ProfileId,
        scores: ModerationScores,
        is_negative: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ReportId::new(),
            content_kind: kind,
            content_id,
            author_id,
            is_negative,
            reason: reason.into(),
            is_resolved: true,
            scores,
            created_at: Utc::now(),
        }
    }
}

/// One tag produced by the tagging stage service: an English form, an
/// Egyptian Arabic form, and a short English description. Formatting rules
/// (lowercase, space-separated, no digits or punctuation, no language names,
/// deduplicated) are enforced by the prompt, not by code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedTag {
    #[serde(alias = "english", alias = "EnglishName")]
    pub english_name: String,
    #[serde(alias = "egyptian_arabic", alias = "ArabicName", alias = "arabic")]
    pub arabic_name: String,
    #[serde(alias = "Description")]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_flag_combinations_decode() {
        assert_eq!(
            ContentState::from_flags(false, false, false).unwrap(),
            ContentState::Pending
        );
        assert_eq!(
            ContentState::from_flags(true, false, false).unwrap(),
            ContentState::Cleared
        );
        assert_eq!(
            ContentState::from_flags(true, true, false).unwrap(),
            ContentState::Tagged
        );
        assert_eq!(
            ContentState::from_flags(true, true, true).unwrap(),
            ContentState::Processed
        );
    }

    #[test]
    fn illegal_flag_combinations_are_rejected() {
        // processed implies safe and tagged
        assert!(ContentState::from_flags(false, false, true).is_err());
        assert!(ContentState::from_flags(true, false, true).is_err());
        assert!(ContentState::from_flags(false, true, true).is_err());
        // tagged implies safe
        assert!(ContentState::from_flags(false, true, false).is_err());
    }

    #[test]
    fn processed_implies_safe_and_tagged() {
        let state = ContentState::Processed;
        assert!(state.is_safe_content());
        assert!(state.is_tagged());
        assert!(state.is_processed());
    }

    #[test]
    fn moderation_scores_accept_pascal_case_fields() {
        let raw = r#"{
            "Toxicity": 0.1,
            "SevereToxicity": 0.05,
            "Obscene": 0.2,
            "Threat": 0.0,
            "Insult": 0.15,
            "IdentityAttack": 0.02,
            "SexualExplicit": 0.3
        }"#;
        let scores: ModerationScores = serde_json::from_str(raw).unwrap();
        assert!((scores.sexual_explicit - 0.3).abs() < f32::EPSILON);
    }
}
