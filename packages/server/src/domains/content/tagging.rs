//! Tag generation and translation stage service.
//!
//! Produces three to six bilingual tags for a content item. Existing tags
//! (supplied by the author at creation time) are translated without changing
//! their meaning; the remainder are generated from the item's title and
//! body. Formatting rules live in the prompt: lowercase, space-separated,
//! no digits or punctuation, no language names, deduplicated.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::domains::content::models::GeneratedTag;
use crate::domains::content::parse::parse_model_json;
use crate::kernel::resilience::{RetryPolicy, StageError};
use crate::kernel::BaseTextModel;

/// Typed result of one tagging call.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TagListResponse {
    #[serde(alias = "Tags")]
    pub tags: Vec<GeneratedTag>,
}

/// Generates and translates categorization tags via the text model.
pub struct TagGenerationService {
    model: Arc<dyn BaseTextModel>,
    retry: RetryPolicy,
}

impl TagGenerationService {
    pub fn new(model: Arc<dyn BaseTextModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Generate tags for an item, translating any `existing_tags` the author
    /// supplied and filling up with newly generated ones.
    pub async fn generate_tags(
        &self,
        title: &str,
        content: &str,
        existing_tags: &[String],
    ) -> Result<Vec<GeneratedTag>, StageError> {
        if title.trim().is_empty() && content.trim().is_empty() {
            return Err(StageError::InvalidInput(
                "tagging input must not be empty".to_string(),
            ));
        }

        let system = Self::system_prompt();
        let user = Self::user_prompt(title, content, existing_tags);
        let schema = serde_json::to_value(schemars::schema_for!(TagListResponse))
            .unwrap_or_default();

        let response = self
            .retry
            .run("tag-generation", || async {
                let raw = self
                    .model
                    .generate_structured(&system, &user, schema.clone(), None)
                    .await
                    .map_err(StageError::Provider)?;
                parse_model_json::<TagListResponse>(&raw)
                    .map_err(StageError::MalformedResponse)
            })
            .await?;

        Ok(response.tags)
    }

    fn system_prompt() -> String {
        [
            "You are an advanced text categorization AI specializing in both English and Egyptian Arabic posts.",
            "Your task is to analyze a given post, detect its language (Arabic, English, Mixed, or Other), and categorize it with relevant tags.",
            "For each tag, you must provide both English and Egyptian Arabic names, along with a concise English description.",
            "If the post already has tags, translate them without changing their meaning and generate additional unique tags.",
            "If the post has no tags, generate new tags from scratch.",
            "Provide a structured output with at least three and at most six tags.",
            "Do not generate any introductory or concluding text.",
            "Tag names should be in English and Egyptian Arabic regardless of the post's language.",
            "Tags should be in lowercase, and separated by space ' '.",
            "Tags should be relevant to the post problem only.",
            "Tags should be unique and not repetitive.",
            "Tags should not contain numbers, or special characters.",
            "Tags should not contain the language name.",
        ]
        .join("\n")
    }

    fn user_prompt(title: &str, content: &str, existing_tags: &[String]) -> String {
        let mut prompt = vec![
            "Categorize the following post based on its content and language.".to_string(),
            "1. First, detect whether the post is in English, Arabic, Mixed, or Other.".to_string(),
            "2. If the post has existing tags, translate them and generate additional unique tags.".to_string(),
            "3. If the post has no tags, generate new tags from scratch.".to_string(),
            "4. For each tag, provide both English and Egyptian Arabic names, along with a description.".to_string(),
            "### Post Title:".to_string(),
            "```".to_string(),
            title.to_string(),
            "```".to_string(),
            "### Post Content:".to_string(),
            "```".to_string(),
            content.to_string(),
            "```".to_string(),
        ];

        if !existing_tags.is_empty() {
            prompt.push("### Existing Tags:".to_string());
            prompt.push(existing_tags.join(", "));
        }

        prompt.join("\n")
    }
}
