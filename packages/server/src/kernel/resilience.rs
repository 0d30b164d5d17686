//! Retry policy for malformed structured output from text models.
//!
//! A probabilistic model occasionally emits JSON that does not parse or does
//! not match the expected shape. That fault class is transient in a way
//! network failures are not: re-issuing the same prompt usually yields a
//! well-formed response. The policy here retries exactly that class —
//! provider/transport errors are left to the HTTP client layer and surface
//! immediately.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the "call model, parse response" unit of work in the
/// stage services.
#[derive(Debug, Error)]
pub enum StageError {
    /// The caller passed input the stage cannot work with (empty text).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model answered, but the answer was not the JSON we asked for.
    /// This is the retryable class.
    #[error("malformed structured output from model: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    /// The provider call itself failed (network, auth, rate limit).
    #[error("text model call failed: {0}")]
    Provider(anyhow::Error),
}

/// Named retry policy for [`StageError::MalformedResponse`] faults.
///
/// Re-issues the full prompt call (not just the parse step) with exponential
/// backoff. Attempt count and base delay come from configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget for malformed responses is exhausted (in which case the
    /// last malformed-response error is returned).
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, StageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(StageError::MalformedResponse(err)) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model returned malformed structured output, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn malformed() -> StageError {
        // Manufacture a representative serde_json error.
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        StageError::MalformedResponse(err)
    }

    #[tokio::test]
    async fn retries_malformed_responses_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result = policy
            .run("test-op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(malformed())
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test-op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(malformed())
            })
            .await;

        assert!(matches!(result, Err(StageError::MalformedResponse(_))));
        // initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn provider_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("test-op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StageError::Provider(anyhow::anyhow!("connection refused")))
            })
            .await;

        assert!(matches!(result, Err(StageError::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
