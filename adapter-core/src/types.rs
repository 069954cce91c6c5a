//! Shared types for the adapter execution core

use crate::result::OperationResult;
use serde::{Deserialize, Serialize};

/// Adapter direction.
///
/// The naming follows the platform convention: an *inbound* adapter pushes
/// messages into the external system (`send*` operations), an *outbound*
/// adapter pulls messages from it (`receive*` and polling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdapterMode {
    /// Push mode: sends to the external system
    Inbound,
    /// Pull mode: receives from the external system
    Outbound,
}

impl std::fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterMode::Inbound => write!(f, "INBOUND"),
            AdapterMode::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

/// Identity of one adapter instance.
///
/// The composite key `type-mode-instance` addresses all per-adapter state:
/// circuit breaker, error statistics, metrics and health.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterIdentity {
    /// Adapter type (e.g. "http", "jdbc", "file")
    pub adapter_type: String,
    /// Direction
    pub mode: AdapterMode,
    /// Instance id, unique per deployment of this type/mode
    pub instance_id: String,
}

impl AdapterIdentity {
    /// Create a new identity
    pub fn new(
        adapter_type: impl Into<String>,
        mode: AdapterMode,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            adapter_type: adapter_type.into(),
            mode,
            instance_id: instance_id.into(),
        }
    }

    /// Composite registry key
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.adapter_type, self.mode, self.instance_id)
    }
}

impl std::fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Completion callback for asynchronous dispatch (async send, polling).
///
/// Exactly one of the two methods is invoked per dispatched operation or
/// polling delivery; the caller is never left without an invocation.
pub trait AdapterCallback: Send + Sync {
    /// Invoked with a successful result
    fn on_success(&self, result: OperationResult);

    /// Invoked with a failure result
    fn on_failure(&self, result: OperationResult);
}
