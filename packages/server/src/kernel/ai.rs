// AI implementation using OpenAI
//
// This is the infrastructure implementation of BaseTextModel and
// BaseEmbeddingModel. Business logic (what to prompt for) lives in the
// content domain's stage services.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::{Deserialize, Serialize};

use super::{BaseEmbeddingModel, BaseTextModel};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
}

const EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// OpenAI implementation of AI capabilities
#[derive(Clone)]
pub struct OpenAIClient {
    client: openai::Client,
    http_client: reqwest::Client,
    api_key: String,
    default_model: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, default_model: String) -> Self {
        let client = openai::Client::new(&api_key);
        Self {
            client,
            http_client: reqwest::Client::new(),
            api_key,
            default_model,
        }
    }

    fn agent(&self, model: &str, preamble: &str) -> rig::agent::Agent<openai::CompletionModel> {
        self.client
            .agent(model)
            .preamble(preamble)
            .max_tokens(4096)
            .build()
    }
}

#[async_trait]
impl BaseTextModel for OpenAIClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let model = self.default_model.as_str();

        tracing::debug!(
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            model,
            "Calling OpenAI chat completion"
        );

        let response = self
            .agent(model, system_prompt)
            .prompt(user_prompt)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, model, "OpenAI API call failed");
                e
            })
            .context("Failed to call OpenAI API")?;

        tracing::debug!(
            response_length = response.len(),
            model,
            "OpenAI API response received"
        );

        Ok(response)
    }

    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
        model: Option<&str>,
    ) -> Result<String> {
        let model = model.unwrap_or(&self.default_model);
        let preamble = format!(
            "{system_prompt}\n\nYour response must be a single raw JSON document \
             conforming to this JSON schema (no markdown, no commentary):\n{schema}"
        );

        tracing::debug!(model, "Calling OpenAI with structured output schema");

        let response = self
            .agent(model, &preamble)
            .prompt(user_prompt)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, model, "OpenAI structured call failed");
                e
            })
            .context("Failed to call OpenAI API")?;

        Ok(response)
    }
}

#[async_trait]
impl BaseEmbeddingModel for OpenAIClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input: texts,
            model: EMBEDDING_MODEL,
        };

        let response = self
            .http_client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request to OpenAI")?;

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(embedding_response
            .data
            .into_iter()
            .map(|d| d.embedding)
            .collect())
    }
}
