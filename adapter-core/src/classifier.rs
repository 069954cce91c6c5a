//! Fault classification and retry-strategy decisioning
//!
//! Every fault raised by an adapter operation is mapped into a closed
//! taxonomy. The classification drives the retry decision table, the
//! circuit-breaker update (only connection/timeout/database faults count
//! toward the trip threshold) and the operator-facing recovery
//! recommendation attached to failure results.

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::types::AdapterIdentity;
use crate::Error;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fault classification taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClassification {
    /// Transport/connect fault
    Connection,
    /// Authentication fault
    Authentication,
    /// Configuration fault
    Configuration,
    /// Malformed input or illegal state
    Validation,
    /// Socket or operation timeout
    Timeout,
    /// Persistence-layer fault
    Database,
    /// General I/O fault
    Io,
    /// TLS or authorization fault
    Security,
    /// Adapter-specific fault
    Adapter,
    /// Unrecognized fault
    Unknown,
}

impl std::fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClassification::Connection => "CONNECTION",
            ErrorClassification::Authentication => "AUTHENTICATION",
            ErrorClassification::Configuration => "CONFIGURATION",
            ErrorClassification::Validation => "VALIDATION",
            ErrorClassification::Timeout => "TIMEOUT",
            ErrorClassification::Database => "DATABASE",
            ErrorClassification::Io => "IO",
            ErrorClassification::Security => "SECURITY",
            ErrorClassification::Adapter => "ADAPTER",
            ErrorClassification::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

impl ErrorClassification {
    /// True for classifications that count toward the circuit-breaker trip
    /// threshold; all others are treated as a success by the breaker.
    pub fn trips_circuit_breaker(&self) -> bool {
        matches!(
            self,
            ErrorClassification::Connection
                | ErrorClassification::Timeout
                | ErrorClassification::Database
        )
    }
}

/// Map a fault into its classification. Fixed order, first match wins.
pub fn classify(error: &Error) -> ErrorClassification {
    match error {
        Error::Connection(_) => ErrorClassification::Connection,
        Error::Timeout { .. } => ErrorClassification::Timeout,
        Error::Security(_) => ErrorClassification::Security,
        Error::Database(_) => ErrorClassification::Database,
        Error::Io(e) => match e.kind() {
            ErrorKind::TimedOut => ErrorClassification::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => ErrorClassification::Connection,
            ErrorKind::PermissionDenied => ErrorClassification::Security,
            _ => ErrorClassification::Io,
        },
        Error::Authentication(_) => ErrorClassification::Authentication,
        Error::Configuration(_) => ErrorClassification::Configuration,
        Error::Validation(_) | Error::Json(_) => ErrorClassification::Validation,
        Error::NotInitialized(_)
        | Error::NotActive(_)
        | Error::PollingAlreadyActive(_)
        | Error::InvalidPollingInterval { .. } => ErrorClassification::Validation,
        Error::Adapter(_)
        | Error::InitializationFailed { .. }
        | Error::CircuitBreakerOpen { .. }
        | Error::BulkheadFull { .. }
        | Error::RetryExhausted { .. } => ErrorClassification::Adapter,
        Error::Other(_) => ErrorClassification::Unknown,
    }
}

/// Operator-facing recovery recommendation for a classification
pub fn recommendation(classification: ErrorClassification) -> &'static str {
    match classification {
        ErrorClassification::Connection => {
            "Check network connectivity and endpoint availability; the operation will be retried"
        }
        ErrorClassification::Timeout => {
            "Increase the operation timeout or check for endpoint slowness; the operation will be retried"
        }
        ErrorClassification::Database => {
            "Check database availability and connection pool sizing; a limited retry is attempted"
        }
        ErrorClassification::Io => "Check file system or stream availability; the operation will be retried",
        ErrorClassification::Authentication => {
            "Verify credentials and token expiry; manual intervention required"
        }
        ErrorClassification::Security => {
            "Verify TLS configuration and authorization grants; manual intervention required"
        }
        ErrorClassification::Configuration => {
            "Review adapter configuration; manual intervention required"
        }
        ErrorClassification::Validation => {
            "Fix the malformed payload or call sequence; retrying will not help"
        }
        ErrorClassification::Adapter => {
            "Inspect the adapter-specific fault details; a single retry is attempted"
        }
        ErrorClassification::Unknown => "Unclassified fault; inspect logs before retrying manually",
    }
}

/// Retry decision derived from a classification and the circuit state.
/// Recomputed per fault, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategy {
    /// Whether another attempt should be made
    pub should_retry: bool,
    /// Maximum number of retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub delay_ms: u64,
    /// Why this decision was taken
    pub reason: String,
}

impl RetryStrategy {
    fn retry(max_retries: u32, delay_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            should_retry: true,
            max_retries,
            delay_ms,
            reason: reason.into(),
        }
    }

    fn no_retry(reason: impl Into<String>) -> Self {
        Self {
            should_retry: false,
            max_retries: 0,
            delay_ms: 0,
            reason: reason.into(),
        }
    }

    /// Decision table keyed by classification. Evaluated only when the
    /// circuit is not already open.
    pub fn for_classification(classification: ErrorClassification, circuit_open: bool) -> Self {
        if circuit_open {
            return Self::no_retry("circuit breaker open");
        }
        match classification {
            ErrorClassification::Connection
            | ErrorClassification::Timeout
            | ErrorClassification::Io => Self::retry(3, 5_000, "transient fault"),
            ErrorClassification::Database => Self::retry(2, 10_000, "limited transient fault"),
            ErrorClassification::Adapter => Self::retry(1, 30_000, "single retry for adapter fault"),
            ErrorClassification::Authentication
            | ErrorClassification::Security
            | ErrorClassification::Configuration
            | ErrorClassification::Validation => Self::no_retry("needs intervention"),
            ErrorClassification::Unknown => Self::no_retry("unclassified fault"),
        }
    }
}

/// Per-adapter error statistics, accumulating until process restart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Error counts per classification
    pub counts: HashMap<ErrorClassification, u64>,
    /// Total error count
    pub total: u64,
    /// First recorded fault
    pub first_error_at: Option<DateTime<Utc>>,
    /// Most recent fault
    pub last_error_at: Option<DateTime<Utc>>,
    /// Most recent fault text
    pub last_error: Option<String>,
}

impl ErrorStatistics {
    fn record(&mut self, classification: ErrorClassification, error: &str) {
        let now = Utc::now();
        *self.counts.entry(classification).or_insert(0) += 1;
        self.total += 1;
        self.first_error_at.get_or_insert(now);
        self.last_error_at = Some(now);
        self.last_error = Some(error.to_string());
    }
}

/// Event emitted once per handled fault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterErrorEvent {
    /// Event id
    pub event_id: Uuid,
    /// Adapter the fault occurred on
    pub identity: AdapterIdentity,
    /// Fault classification
    pub classification: ErrorClassification,
    /// Fault text
    pub error: String,
    /// Caller-supplied context (operation name, attempt number, ...)
    pub context: HashMap<String, String>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

/// Listener for adapter error events. Failures are logged and isolated,
/// never propagated to the operation caller.
pub trait ErrorListener: Send + Sync {
    /// Handle one error event
    fn on_error(&self, event: &AdapterErrorEvent) -> anyhow::Result<()>;
}

/// Central fault handler: classification, statistics, circuit-breaker
/// update and listener fan-out.
pub struct ErrorHandler {
    statistics: DashMap<String, ErrorStatistics>,
    listeners: DashMap<String, Arc<dyn ErrorListener>>,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ErrorHandler {
    /// Create a handler updating the given breaker registry
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            statistics: DashMap::new(),
            listeners: DashMap::new(),
            breakers,
        }
    }

    /// Handle one fault: classify, record statistics, update the breaker,
    /// notify listeners and return the retry strategy for this fault.
    pub fn handle(
        &self,
        identity: &AdapterIdentity,
        error: &Error,
        context: HashMap<String, String>,
    ) -> RetryStrategy {
        let classification = classify(error);
        let key = identity.key();

        self.statistics
            .entry(key.clone())
            .or_default()
            .record(classification, &error.to_string());

        if classification.trips_circuit_breaker() {
            self.breakers.record_failure(identity);
        } else {
            self.breakers.record_success(identity);
        }

        let event = AdapterErrorEvent {
            event_id: Uuid::new_v4(),
            identity: identity.clone(),
            classification,
            error: error.to_string(),
            context,
            timestamp: Utc::now(),
        };
        for listener in self.listeners.iter() {
            if let Err(e) = listener.value().on_error(&event) {
                warn!("Error listener {} failed: {}", listener.key(), e);
            }
        }

        let circuit_open = !self.breakers.is_call_allowed(identity);
        let strategy = RetryStrategy::for_classification(classification, circuit_open);
        debug!(
            "Fault on {} classified as {} (retry: {}): {}",
            key,
            classification,
            strategy.should_retry,
            recommendation(classification)
        );
        strategy
    }

    /// Register an error listener under a unique name
    pub fn register_listener(&self, name: impl Into<String>, listener: Arc<dyn ErrorListener>) {
        self.listeners.insert(name.into(), listener);
    }

    /// Unregister an error listener
    pub fn unregister_listener(&self, name: &str) {
        self.listeners.remove(name);
    }

    /// Snapshot of the statistics for one adapter
    pub fn statistics(&self, identity: &AdapterIdentity) -> Option<ErrorStatistics> {
        self.statistics.get(&identity.key()).map(|s| s.clone())
    }

    /// Snapshot of all per-adapter statistics
    pub fn all_statistics(&self) -> HashMap<String, ErrorStatistics> {
        self.statistics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Drop all state for an adapter (called on destroy/unregister)
    pub fn clear(&self, identity: &AdapterIdentity) {
        self.statistics.remove(&identity.key());
    }

    /// Check a fault against the breaker registry without handling it
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }
}
