//! Resilience pipeline composing circuit breaker, bulkhead and retry
//!
//! A single timed operation runs through, outermost to innermost:
//! circuit breaker -> bulkhead -> retry -> raw operation. An open breaker
//! or a saturated bulkhead short-circuits to a fallback result without
//! invoking the layers beneath it. Nothing escapes the pipeline as an
//! error; callers always get an [`OperationResult`].

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::classifier::{classify, recommendation, ErrorHandler};
use crate::metrics::{ADAPTER_OPERATIONS_TOTAL, ADAPTER_OPERATION_DURATION};
use crate::monitoring::MonitoringService;
use crate::result::OperationResult;
use crate::retry::RetryExecutor;
use crate::types::AdapterIdentity;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// RAII admission guard returned by a bulkhead; the slot is released when
/// the guard is dropped.
pub struct BulkheadGuard {
    _permit: Box<dyn Any + Send>,
}

impl BulkheadGuard {
    /// Wrap an implementation-specific permit
    pub fn new(permit: impl Any + Send + 'static) -> Self {
        Self {
            _permit: Box::new(permit),
        }
    }
}

/// Concurrency admission control collaborator. Implementations live
/// outside this crate; absence of wiring means every call is admitted.
#[async_trait]
pub trait Bulkhead: Send + Sync {
    /// Attempt to admit a call for the given scope and instance key.
    /// Returns `None` when resources are exhausted.
    async fn try_acquire(&self, scope: &str, instance: &str) -> Option<BulkheadGuard>;
}

/// The composed resilience pipeline shared by all adapters
pub struct ResiliencePipeline {
    breakers: Arc<CircuitBreakerRegistry>,
    errors: Arc<ErrorHandler>,
    retry: RetryExecutor,
    bulkhead: Option<Arc<dyn Bulkhead>>,
    monitoring: Option<Arc<MonitoringService>>,
}

impl ResiliencePipeline {
    /// Create a pipeline. Bulkhead and monitoring are optional
    /// collaborators; every call site tolerates their absence.
    pub fn new(
        breakers: Arc<CircuitBreakerRegistry>,
        errors: Arc<ErrorHandler>,
        bulkhead: Option<Arc<dyn Bulkhead>>,
        monitoring: Option<Arc<MonitoringService>>,
    ) -> Self {
        let retry = RetryExecutor::new(Arc::clone(&errors));
        Self {
            breakers,
            errors,
            retry,
            bulkhead,
            monitoring,
        }
    }

    /// Execute one operation through the full pipeline and return its
    /// timed, metadata-carrying result.
    pub async fn execute<F>(
        &self,
        identity: &AdapterIdentity,
        operation: &str,
        f: F,
    ) -> OperationResult
    where
        F: Fn() -> BoxFuture<'static, Result<Option<Value>>> + Send + Sync,
    {
        let key = identity.key();
        let start = Instant::now();

        if !self.breakers.is_call_allowed(identity) {
            warn!("Rejecting {} on {}: circuit breaker open", operation, key);
            ADAPTER_OPERATIONS_TOTAL
                .with_label_values(&[&key, operation, "rejected"])
                .inc();
            return OperationResult::failure(
                "circuit breaker open",
                format!("circuit breaker open for adapter {}", key),
            )
            .with_metadata("operation", operation)
            .with_duration(start.elapsed());
        }

        let _guard = match &self.bulkhead {
            Some(bulkhead) => match bulkhead.try_acquire("adapter", &key).await {
                Some(guard) => Some(guard),
                None => {
                    warn!("Rejecting {} on {}: resources exhausted", operation, key);
                    ADAPTER_OPERATIONS_TOTAL
                        .with_label_values(&[&key, operation, "rejected"])
                        .inc();
                    let fault = Error::BulkheadFull {
                        adapter: key.clone(),
                    };
                    return OperationResult::failure("resources exhausted", fault.to_string())
                        .with_metadata("operation", operation)
                        .with_duration(start.elapsed());
                }
            },
            None => None,
        };

        let attempts = Arc::new(AtomicU32::new(0));
        let counted = {
            let attempts = Arc::clone(&attempts);
            move || {
                attempts.fetch_add(1, Ordering::SeqCst);
                f()
            }
        };
        let outcome = self.retry.execute(identity, operation, counted).await;

        let duration = start.elapsed();
        let attempts = attempts.load(Ordering::SeqCst);
        ADAPTER_OPERATION_DURATION
            .with_label_values(&[&key, operation])
            .observe(duration.as_secs_f64());

        match outcome {
            Ok(data) => {
                ADAPTER_OPERATIONS_TOTAL
                    .with_label_values(&[&key, operation, "success"])
                    .inc();
                if let Some(monitoring) = &self.monitoring {
                    monitoring.record_success(identity, duration);
                }
                OperationResult::success_with_data(format!("{} completed", operation), data)
                    .with_metadata("operation", operation)
                    .with_metadata("attempts", attempts)
                    .with_duration(duration)
            }
            Err(e) => {
                ADAPTER_OPERATIONS_TOTAL
                    .with_label_values(&[&key, operation, "failure"])
                    .inc();
                if let Some(monitoring) = &self.monitoring {
                    monitoring.record_failure(identity, duration, &e.to_string());
                }
                OperationResult::from_error(&e)
                    .with_metadata("operation", operation)
                    .with_metadata("attempts", attempts)
                    .with_metadata("recommendation", recommendation(classify(&e)))
                    .with_duration(duration)
            }
        }
    }

    /// The breaker registry backing this pipeline
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// The fault handler backing this pipeline
    pub fn errors(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    /// The retry executor (exposed for custom-policy operations)
    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// The monitoring collaborator, if wired
    pub fn monitoring(&self) -> Option<&Arc<MonitoringService>> {
        self.monitoring.as_ref()
    }

    /// Drop all per-adapter pipeline state (breaker, error statistics)
    pub fn forget(&self, identity: &AdapterIdentity) {
        self.breakers.remove(identity);
        self.errors.clear(identity);
    }
}
