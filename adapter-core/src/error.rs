//! Error types for the adapter execution core

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Timeout
    #[error("Timeout after {millis}ms: {operation}")]
    Timeout {
        /// Timeout duration
        millis: u64,
        /// Operation
        operation: String,
    },

    /// Security error (TLS, authorization)
    #[error("Security error: {0}")]
    Security(String),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation error (malformed input, illegal state)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Adapter-specific error
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Circuit breaker open
    #[error("Circuit breaker open for adapter {adapter}: {reason}")]
    CircuitBreakerOpen {
        /// Adapter key
        adapter: String,
        /// Reason
        reason: String,
    },

    /// Bulkhead rejected the call
    #[error("Resources exhausted for adapter {adapter}: bulkhead rejected call")]
    BulkheadFull {
        /// Adapter key
        adapter: String,
    },

    /// Adapter not initialized
    #[error("Adapter {0} is not initialized")]
    NotInitialized(String),

    /// Adapter not active
    #[error("Adapter {0} is not active")]
    NotActive(String),

    /// Initialization hook failed
    #[error("Initialization failed for adapter {adapter}: {reason}")]
    InitializationFailed {
        /// Adapter key
        adapter: String,
        /// Reason
        reason: String,
    },

    /// Polling already active
    #[error("Polling already active for adapter {0}")]
    PollingAlreadyActive(String),

    /// Invalid polling interval
    #[error("Invalid polling interval: {millis}ms")]
    InvalidPollingInterval {
        /// Configured interval
        millis: u64,
    },

    /// Retry exhausted
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Attempts
        attempts: u32,
        /// Last error
        last_error: String,
    },

    /// Generic error
    #[error("Adapter internal error: {0}")]
    Other(#[from] anyhow::Error),
}
