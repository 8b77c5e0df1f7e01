//! Retry wrapper for LLM clients.
//!
//! Retries transient failures with exponential backoff. Permanent failures are
//! returned immediately.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MedshopError, Result};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Wraps an [`LlmClient`] and retries calls that fail with a transient error.
///
/// When the last attempt still fails transiently the error is reported as a
/// generation failure.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: LlmClient> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingClient<C> {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let max_attempts = self.policy.max_attempts();
        let mut delay = self.policy.base_delay;
        let mut attempt = 1;

        loop {
            debug!("LLM request attempt {} of {}", attempt, max_attempts);

            match self.inner.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        "LLM request failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(MedshopError::into_generation(e)),
            }
        }
    }
}
