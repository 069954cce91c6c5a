//! Operation result value type returned by every adapter operation

use crate::classifier::{classify, ErrorClassification};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Operation outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Operation completed successfully
    Success,
    /// Operation failed
    Failure,
    /// Batch operation with mixed outcomes
    PartialSuccess,
    /// Operation timed out
    Timeout,
    /// Connection-level failure
    ConnectionError,
    /// Authentication failure
    AuthenticationError,
    /// Validation failure
    ValidationError,
}

impl OperationStatus {
    /// True for every terminal failure status
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OperationStatus::Failure
                | OperationStatus::ConnectionError
                | OperationStatus::AuthenticationError
                | OperationStatus::ValidationError
                | OperationStatus::Timeout
        )
    }
}

/// Immutable outcome of a single adapter operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Outcome status
    pub status: OperationStatus,
    /// Human-readable message
    pub message: String,
    /// Payload returned by the operation, if any
    pub data: Option<Value>,
    /// Underlying error text, if any
    pub error: Option<String>,
    /// Operation metadata (always includes `operation`; batch operations
    /// add `success_count`/`failure_count`/`total_count`)
    pub metadata: HashMap<String, Value>,
    /// Completion timestamp
    pub timestamp: DateTime<Utc>,
    /// Elapsed duration in milliseconds
    pub duration_ms: u64,
}

impl OperationResult {
    fn new(status: OperationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
            error: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Successful result without payload
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OperationStatus::Success, message)
    }

    /// Successful result with optional payload
    pub fn success_with_data(message: impl Into<String>, data: Option<Value>) -> Self {
        let mut result = Self::new(OperationStatus::Success, message);
        result.data = data;
        result
    }

    /// Partial-success result for mixed batch outcomes
    pub fn partial_success(message: impl Into<String>) -> Self {
        Self::new(OperationStatus::PartialSuccess, message)
    }

    /// Failed result with a generic failure status
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(OperationStatus::Failure, message);
        result.error = Some(error.into());
        result
    }

    /// Failed result with the status derived from the fault classification
    pub fn from_error(error: &Error) -> Self {
        let status = match classify(error) {
            ErrorClassification::Connection => OperationStatus::ConnectionError,
            ErrorClassification::Timeout => OperationStatus::Timeout,
            ErrorClassification::Authentication => OperationStatus::AuthenticationError,
            ErrorClassification::Validation => OperationStatus::ValidationError,
            _ => OperationStatus::Failure,
        };
        let mut result = Self::new(status, error.to_string());
        result.error = Some(error.to_string());
        result
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the elapsed duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// True iff the status is `Success`
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// True iff the status is a terminal failure (partial success is neither)
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_predicates() {
        assert!(OperationResult::success("ok").is_success());
        assert!(!OperationResult::success("ok").is_failure());
        assert!(OperationResult::failure("bad", "boom").is_failure());

        let partial = OperationResult::partial_success("mixed");
        assert!(!partial.is_success());
        assert!(!partial.is_failure());
    }

    #[test]
    fn test_from_error_maps_status() {
        let result = OperationResult::from_error(&Error::Connection("refused".into()));
        assert_eq!(result.status, OperationStatus::ConnectionError);
        assert!(result.error.unwrap().contains("refused"));

        let result = OperationResult::from_error(&Error::Timeout {
            millis: 30_000,
            operation: "send".into(),
        });
        assert_eq!(result.status, OperationStatus::Timeout);

        let result = OperationResult::from_error(&Error::Authentication("denied".into()));
        assert_eq!(result.status, OperationStatus::AuthenticationError);

        let result = OperationResult::from_error(&Error::Validation("bad payload".into()));
        assert_eq!(result.status, OperationStatus::ValidationError);

        let result = OperationResult::from_error(&Error::Database("deadlock".into()));
        assert_eq!(result.status, OperationStatus::Failure);
    }

    #[test]
    fn test_metadata_and_duration() {
        let result = OperationResult::success_with_data("done", Some(json!({"id": 7})))
            .with_metadata("operation", "send")
            .with_metadata("attempts", 2u32)
            .with_duration(Duration::from_millis(120));

        assert_eq!(result.metadata["operation"], json!("send"));
        assert_eq!(result.metadata["attempts"], json!(2));
        assert_eq!(result.duration_ms, 120);
        assert_eq!(result.data, Some(json!({"id": 7})));
    }
}
