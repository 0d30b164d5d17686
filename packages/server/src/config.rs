use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub openai_api_key: String,

    /// Chat model used by the moderation and tagging stage services.
    pub text_model: String,

    /// Cron expressions (seconds-resolution, tokio-cron-scheduler syntax)
    /// for the three periodic jobs.
    pub content_scan_cron: String,
    pub media_gc_cron: String,
    pub notification_cleanup_cron: String,

    /// Retry policy for malformed structured output from the text model.
    pub llm_retry_max_attempts: u32,
    pub llm_retry_base_delay: Duration,

    /// Admission gate and cache sizing for the embedding service.
    pub embedding_max_concurrent: usize,
    pub embedding_cache_capacity: usize,
    pub embedding_cache_ttl: Duration,

    /// Media garbage collection.
    pub media_bucket: String,
    pub media_grant_grace: Duration,

    pub moderation_thresholds: ModerationThresholds,
}

/// Per-category probability thresholds above which content is considered
/// inappropriate. Scores come back from the moderation stage service in
/// [0, 1]; any category meeting or exceeding its threshold flags the item.
#[derive(Debug, Clone, Copy)]
pub struct ModerationThresholds {
    pub toxicity: f32,
    pub severe_toxicity: f32,
    pub obscene: f32,
    pub threat: f32,
    pub insult: f32,
    pub identity_attack: f32,
    pub sexual_explicit: f32,
}

impl Default for ModerationThresholds {
    fn default() -> Self {
        Self {
            toxicity: 0.85,
            severe_toxicity: 0.70,
            obscene: 0.80,
            threat: 0.70,
            insult: 0.80,
            identity_attack: 0.75,
            sexual_explicit: 0.80,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = ModerationThresholds::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            text_model: env::var("TEXT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            content_scan_cron: env::var("CONTENT_SCAN_CRON")
                .unwrap_or_else(|_| "0 0 3 * * *".to_string()),
            media_gc_cron: env::var("MEDIA_GC_CRON")
                .unwrap_or_else(|_| "0 30 4 * * *".to_string()),
            notification_cleanup_cron: env::var("NOTIFICATION_CLEANUP_CRON")
                .unwrap_or_else(|_| "0 0 5 * * *".to_string()),
            llm_retry_max_attempts: parse_env("LLM_RETRY_MAX_ATTEMPTS", 3u32)?,
            llm_retry_base_delay: Duration::from_millis(parse_env(
                "LLM_RETRY_BASE_DELAY_MS",
                2_000u64,
            )?),
            embedding_max_concurrent: parse_env("EMBEDDING_MAX_CONCURRENT", 1usize)?,
            embedding_cache_capacity: parse_env("EMBEDDING_CACHE_CAPACITY", 1_024usize)?,
            embedding_cache_ttl: Duration::from_secs(parse_env(
                "EMBEDDING_CACHE_TTL_SECS",
                86_400u64,
            )?),
            media_bucket: env::var("MEDIA_BUCKET").context("MEDIA_BUCKET must be set")?,
            media_grant_grace: Duration::from_secs(parse_env(
                "MEDIA_GRANT_GRACE_SECS",
                3_600u64,
            )?),
            moderation_thresholds: ModerationThresholds {
                toxicity: parse_env("MODERATION_TOXICITY_THRESHOLD", defaults.toxicity)?,
                severe_toxicity: parse_env(
                    "MODERATION_SEVERE_TOXICITY_THRESHOLD",
                    defaults.severe_toxicity,
                )?,
                obscene: parse_env("MODERATION_OBSCENE_THRESHOLD", defaults.obscene)?,
                threat: parse_env("MODERATION_THREAT_THRESHOLD", defaults.threat)?,
                insult: parse_env("MODERATION_INSULT_THRESHOLD", defaults.insult)?,
                identity_attack: parse_env(
                    "MODERATION_IDENTITY_ATTACK_THRESHOLD",
                    defaults.identity_attack,
                )?,
                sexual_explicit: parse_env(
                    "MODERATION_SEXUAL_EXPLICIT_THRESHOLD",
                    defaults.sexual_explicit,
                )?,
            },
        })
    }
}

/// Read an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
