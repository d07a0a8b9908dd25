// Exponential-backoff retry for transient provider failures.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetrySection;
use crate::error::ProviderError;

use super::{GenerateRequest, Generation, LlmProvider};

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySection::default())
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            initial_backoff: Duration::from_secs(section.initial_backoff_secs),
            multiplier: section.multiplier.max(1),
            max_backoff: Duration::from_secs(section.max_backoff_secs),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based): `initial * multiplier^(retry-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Wraps a provider and retries transient failures with backoff.
///
/// Non-transient errors propagate on the first occurrence. When every
/// attempt fails transiently the final error is wrapped in
/// [`ProviderError::RetriesExhausted`].
#[derive(Debug)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: LlmProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait::async_trait]
impl<P: LlmProvider> LlmProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        let mut attempt = 1u32;
        loop {
            match self.inner.generate(request).await {
                Ok(generation) => {
                    if attempt > 1 {
                        debug!(
                            provider = self.inner.name(),
                            attempt, "Provider call succeeded after retry"
                        );
                    }
                    return Ok(generation);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        provider = self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "Transient provider failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
