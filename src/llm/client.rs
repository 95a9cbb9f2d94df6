use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::VisionConfig;
use crate::errors::{ScreenPointError, ScreenPointResult};
use crate::llm::provider::VisionProvider;
use crate::llm::registry::build_provider;
use crate::llm::types::{ImagePayload, VisionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(45),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(vision: &VisionConfig) -> Self {
        Self {
            max_attempts: vision.max_attempts.max(1),
            backoff_base: Duration::from_millis(vision.backoff_base_ms),
            attempt_timeout: Duration::from_secs(vision.timeout_secs.max(1)),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, …
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Provider-agnostic entry point: one wire format, wrapped in retries,
/// per-attempt timeouts and cancellation.
#[derive(Clone)]
pub struct VisionProviderClient {
    provider: Arc<dyn VisionProvider>,
    policy: RetryPolicy,
}

impl VisionProviderClient {
    pub fn new(provider: Arc<dyn VisionProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn from_config(vision: &VisionConfig) -> ScreenPointResult<Self> {
        Ok(Self::new(build_provider(vision)?, RetryPolicy::from_config(vision)))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sends `image` + `prompt` and returns the model's text.
    ///
    /// Transient failures (timeouts, 5xx, 429, dropped connections, empty
    /// answers) are retried with exponential backoff; anything else fails on
    /// the spot. Once the budget is spent the last cause is wrapped in
    /// `ProviderExhausted`.
    pub async fn complete(
        &self,
        image: ImagePayload,
        prompt: &str,
        max_tokens: u32,
        cancel: &CancellationToken,
    ) -> ScreenPointResult<String> {
        let request = VisionRequest {
            image,
            prompt: prompt.to_string(),
            max_tokens,
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(ScreenPointError::Cancelled);
            }
            tracing::debug!(provider = self.provider.name(), attempt, max_attempts, "vision request attempt");

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ScreenPointError::Cancelled),
                res = tokio::time::timeout(self.policy.attempt_timeout, self.provider.complete(&request)) => res,
            };
            let error = match outcome {
                Ok(Ok(text)) => {
                    if attempt > 1 {
                        tracing::info!(provider = self.provider.name(), attempt, "vision request succeeded after retry");
                    }
                    return Ok(text);
                }
                Ok(Err(e)) => e,
                Err(_) => ScreenPointError::Timeout {
                    operation: "vision request",
                    millis: self.policy.attempt_timeout.as_millis() as u64,
                },
            };

            if !error.is_transient() {
                tracing::error!(provider = self.provider.name(), attempt, error = %error, "vision request failed permanently");
                return Err(error);
            }
            if attempt >= max_attempts {
                tracing::error!(provider = self.provider.name(), attempts = attempt, error = %error, "vision provider exhausted");
                return Err(ScreenPointError::ProviderExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.backoff(attempt);
            tracing::warn!(
                provider = self.provider.name(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient vision failure, backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(ScreenPointError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
