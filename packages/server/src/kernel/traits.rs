// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (what to prompt for, what to delete) lives in domain code
// that consumes these traits.
//
// Naming convention: Base* for trait names (e.g., BaseTextModel)

use anyhow::Result;
use async_trait::async_trait;

// =============================================================================
// Text model trait (LLM completions)
// =============================================================================

#[async_trait]
pub trait BaseTextModel: Send + Sync {
    /// Run a chat completion with a system prompt and a user prompt,
    /// returning the raw text response.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    /// Run a chat completion expecting structured JSON output conforming to
    /// `schema`, optionally overriding the default model.
    ///
    /// The default implementation appends the schema to the system prompt and
    /// asks for raw JSON; providers with native structured-output support can
    /// override.
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
        model: Option<&str>,
    ) -> Result<String> {
        let _ = model;
        let combined = format!(
            "{system_prompt}\n\nYour response must be a single raw JSON document \
             conforming to this JSON schema (no markdown, no commentary):\n{schema}"
        );
        self.generate(&combined, user_prompt).await
    }
}

// =============================================================================
// Embedding model trait
// =============================================================================

#[async_trait]
pub trait BaseEmbeddingModel: Send + Sync {
    /// Generate one embedding vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
