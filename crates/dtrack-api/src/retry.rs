//! Exponential backoff for read requests.
//!
//! Only idempotent GETs go through the policy. Mutations are issued once and
//! their failure is reported to the caller as-is.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given max retries and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: 10_000,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Whether `error` should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        error.is_retryable() || error.is_server_error()
    }

    /// Delay before the given attempt: `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Execute an async read with retry.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ApiResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Read succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt > 0 && attempt >= self.max_retries {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %error,
                                "Max retries exceeded"
                            );
                            return Err(ApiError::MaxRetriesExceeded {
                                attempts: attempt + 1,
                                message: format!("{operation_name}: {error}"),
                            });
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying read after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
