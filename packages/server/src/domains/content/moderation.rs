//! Inappropriate-content detection stage service.
//!
//! Builds a fixed system prompt and a per-item user prompt, calls the text
//! model through the malformed-output retry policy, and parses the response
//! into per-category probabilities. Threshold evaluation happens in the
//! moderation consumer, not here.

use std::sync::Arc;

use crate::domains::content::models::ModerationScores;
use crate::domains::content::parse::parse_model_json;
use crate::kernel::resilience::{RetryPolicy, StageError};
use crate::kernel::BaseTextModel;

/// Detects NSFW and toxic language in user content via the text model.
pub struct NsfwDetectionService {
    model: Arc<dyn BaseTextModel>,
    retry: RetryPolicy,
}

impl NsfwDetectionService {
    pub fn new(model: Arc<dyn BaseTextModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// Analyze `text` and return the likelihood of each NSFW category.
    pub async fn detect(&self, text: &str) -> Result<ModerationScores, StageError> {
        if text.trim().is_empty() {
            return Err(StageError::InvalidInput(
                "moderation input must not be empty".to_string(),
            ));
        }

        let system = Self::system_prompt();
        let user = Self::user_prompt(text);

        self.retry
            .run("nsfw-detection", || async {
                let raw = self
                    .model
                    .generate(&system, &user)
                    .await
                    .map_err(StageError::Provider)?;
                parse_model_json::<ModerationScores>(&raw)
                    .map_err(StageError::MalformedResponse)
            })
            .await
    }

    fn output_format_schema() -> String {
        let schema = schemars::schema_for!(ModerationScores);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    fn system_prompt() -> String {
        [
            "You are an AI moderation system specializing in the detection of NSFW and toxic language across multiple languages, including English and Egyptian Arabic.",
            "Your task is to analyze the given text and output the likelihood (as a probability between 0 and 1) that it falls into each of the following categories:",
            "toxicity, severe_toxicity, obscene, threat, insult, identity_attack, sexual_explicit.",
            "Base your evaluation on linguistic meaning, intent, and contextual cues, not only on isolated words. Be sensitive to cultural nuances and slang used in Arabic and English code-switching.",
            "Your response must strictly be a valid JSON object conforming to the following schema:",
            &Self::output_format_schema(),
            "Each probability value must be a numeric value between 0 and 1, inclusive, rounded to five decimal places.",
            "Do not include any explanations, comments, markdown formatting, or additional fields. Output only the JSON object.",
            "If uncertain, make a probabilistic estimation based on linguistic cues rather than abstaining.",
        ]
        .join("\n")
    }

    fn user_prompt(text: &str) -> String {
        [
            "Please analyze the following text and return your classification according to the NSFW detection results.",
            "The text is:",
            text,
        ]
        .join("\n")
    }
}
