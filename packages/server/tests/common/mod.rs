//! Shared fixtures for pipeline tests.

use chrono::Utc;
use server_core::common::ProfileId;
use server_core::domains::content::{ContentItem, ContentState};

/// Build a content item in the given pipeline state.
pub fn item(state: ContentState, title: &str) -> ContentItem {
    ContentItem {
        id: uuid::Uuid::now_v7(),
        author_id: ProfileId::new(),
        title: title.to_string(),
        content: format!("{title} body"),
        state,
        embedding: None,
        created_at: Utc::now(),
    }
}

/// A moderation response every category of which is comfortably below the
/// default thresholds.
pub fn harmless_scores_json() -> String {
    r#"{
        "toxicity": 0.02,
        "severe_toxicity": 0.01,
        "obscene": 0.03,
        "threat": 0.0,
        "insult": 0.02,
        "identity_attack": 0.01,
        "sexual_explicit": 0.0
    }"#
    .to_string()
}

/// A moderation response that trips the toxicity threshold.
pub fn toxic_scores_json() -> String {
    r#"{
        "toxicity": 0.97,
        "severe_toxicity": 0.88,
        "obscene": 0.4,
        "threat": 0.2,
        "insult": 0.91,
        "identity_attack": 0.3,
        "sexual_explicit": 0.1
    }"#
    .to_string()
}

/// A well-formed tagging response with three tags.
pub fn tags_json() -> String {
    r#"{
        "tags": [
            {"english_name": "web development", "arabic_name": "تطوير الويب", "description": "Building web applications"},
            {"english_name": "remote work", "arabic_name": "شغل عن بعد", "description": "Working remotely"},
            {"english_name": "hiring", "arabic_name": "توظيف", "description": "Job openings and recruitment"}
        ]
    }"#
    .to_string()
}
