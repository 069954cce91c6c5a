//! Bounded retry with exponential backoff and jitter
//!
//! The standard path derives attempts and delays from the fault
//! classification; a custom [`RetryPolicy`] variant exists for operations
//! outside the classifier (test utilities, maintenance jobs).

use crate::classifier::ErrorHandler;
use crate::types::AdapterIdentity;
use crate::{Error, Result};
use futures::future::BoxFuture;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Custom retry policy for operations outside the standard classifier
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds
    pub base_delay_ms: u64,
    /// Double the delay per attempt when true
    pub exponential: bool,
    /// Apply random jitter when true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 5_000,
            exponential: true,
            jitter: true,
        }
    }
}

/// Compute the backoff delay for a given attempt (1-based). The exponential
/// term is capped at [`crate::MAX_BACKOFF_DELAY_MS`] before jitter is
/// applied; jitter is uniform in [0.75, 1.25].
pub fn compute_delay(base_delay_ms: u64, attempt: u32, exponential: bool, jitter: bool) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let raw = if exponential {
        base_delay_ms.saturating_mul(1u64 << exponent)
    } else {
        base_delay_ms
    };
    let capped = raw.min(crate::MAX_BACKOFF_DELAY_MS);
    let millis = if jitter {
        let factor = rand::thread_rng().gen_range(crate::JITTER_MIN..=crate::JITTER_MAX);
        (capped as f64 * factor) as u64
    } else {
        capped
    };
    Duration::from_millis(millis)
}

/// Retry executor: runs an operation until success, exhaustion or a
/// non-retryable classification, consulting the circuit breaker before
/// every attempt.
pub struct RetryExecutor {
    errors: Arc<ErrorHandler>,
}

impl RetryExecutor {
    /// Create an executor backed by the given fault handler
    pub fn new(errors: Arc<ErrorHandler>) -> Self {
        Self { errors }
    }

    /// Execute with classifier-driven retries.
    ///
    /// The breaker is checked before every attempt, covering the case where
    /// an earlier attempt within this loop tripped it. Backoff sleeps on
    /// the calling task for the full delay.
    pub async fn execute<F>(
        &self,
        identity: &AdapterIdentity,
        operation: &str,
        f: F,
    ) -> Result<Option<Value>>
    where
        F: Fn() -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            if !self.errors.breakers().is_call_allowed(identity) {
                return Err(Error::CircuitBreakerOpen {
                    adapter: identity.key(),
                    reason: format!("rejected before attempt {} of {}", attempt + 1, operation),
                });
            }

            match f().await {
                Ok(value) => {
                    self.errors.breakers().record_success(identity);
                    return Ok(value);
                }
                Err(e) => {
                    attempt += 1;
                    let mut context = HashMap::new();
                    context.insert("operation".to_string(), operation.to_string());
                    context.insert("attempt".to_string(), attempt.to_string());
                    let strategy = self.errors.handle(identity, &e, context);

                    // A qualifying fault may have tripped the breaker just now
                    if !self.errors.breakers().is_call_allowed(identity) {
                        return Err(Error::CircuitBreakerOpen {
                            adapter: identity.key(),
                            reason: format!("tripped during {} at attempt {}", operation, attempt),
                        });
                    }

                    if !strategy.should_retry || attempt > strategy.max_retries {
                        debug!(
                            "Not retrying {} on {} after attempt {}: {}",
                            operation,
                            identity.key(),
                            attempt,
                            strategy.reason
                        );
                        return Err(e);
                    }

                    let delay = compute_delay(strategy.delay_ms, attempt, true, true);
                    warn!(
                        "Attempt {} of {} failed on {} ({}), retrying in {:?}",
                        attempt,
                        operation,
                        identity.key(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Execute with an explicit policy, bypassing the classifier and the
    /// circuit breaker.
    pub async fn execute_with_policy<F>(
        &self,
        policy: &RetryPolicy,
        operation: &str,
        f: F,
    ) -> Result<Option<Value>>
    where
        F: Fn() -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync,
    {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt == attempts => {
                    return Err(Error::RetryExhausted {
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay =
                        compute_delay(policy.base_delay_ms, attempt, policy.exponential, policy.jitter);
                    warn!(
                        "Attempt {}/{} of {} failed ({}), retrying in {:?}",
                        attempt, attempts, operation, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        unreachable!("retry loop returns on the final attempt")
    }
}
