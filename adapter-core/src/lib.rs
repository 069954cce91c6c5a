//! # Conduit Adapter Core
//!
//! Execution core for pluggable connectors to external systems with:
//! - Shared adapter lifecycle (init / active / destroy)
//! - Layered resilience pipeline (circuit breaker, bulkhead, retry)
//! - Fault classification with retry-strategy decisioning
//! - Inbound (push) and outbound (pull + polling) dispatch
//! - Per-adapter monitoring, health checks and alerting
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Adapter (In/Outbound)                │
//! │          lifecycle: init → active → destroy          │
//! └────────────┬─────────────────────────────────────────┘
//!              │ send / receive / poll
//! ┌────────────▼─────────────────────────────────────────┐
//! │               Resilience Pipeline                    │
//! │   circuit breaker → bulkhead → retry → raw call      │
//! └────────────┬─────────────────────────────────────────┘
//!              │ faults
//! ┌────────────▼──────────┐  ┌──────────────────────────┐
//! │   Error Classifier    │  │  Monitoring & Alerting   │
//! │  stats + strategy     │  │  metrics, health, alerts │
//! └───────────────────────┘  └──────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod circuit_breaker;
pub mod classifier;
pub mod error;
pub mod inbound;
pub mod lifecycle;
pub mod metrics;
pub mod monitoring;
pub mod outbound;
pub mod pipeline;
pub mod result;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use inbound::{InboundAdapter, InboundConnector};
pub use lifecycle::{AdapterCore, Connector};
pub use monitoring::{AlertEvent, AlertHandler, AlertLevel, MonitoringConfig, MonitoringService};
pub use outbound::{OutboundAdapter, OutboundConnector};
pub use pipeline::{Bulkhead, BulkheadGuard, ResiliencePipeline};
pub use result::{OperationResult, OperationStatus};
pub use types::{AdapterCallback, AdapterIdentity, AdapterMode};

/// Default circuit breaker threshold (consecutive failures before opening)
pub const DEFAULT_CB_FAILURE_THRESHOLD: u32 = 5;

/// Default circuit breaker open timeout (milliseconds before half-open)
pub const DEFAULT_CB_TIMEOUT_MS: u64 = 60_000;

/// Cap applied to the exponential backoff term before jitter
pub const MAX_BACKOFF_DELAY_MS: u64 = 60_000;

/// Lower jitter bound applied to backoff delays
pub const JITTER_MIN: f64 = 0.75;

/// Upper jitter bound applied to backoff delays
pub const JITTER_MAX: f64 = 1.25;

/// Default interval between monitoring health-check sweeps
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;

/// Default retention window for per-adapter metrics
pub const DEFAULT_METRICS_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Bounded wait for in-flight adapter work during destroy
pub const DESTROY_WAIT_SECS: u64 = 5;

/// Bounded wait for the monitoring schedulers during shutdown
pub const MONITOR_SHUTDOWN_WAIT_SECS: u64 = 10;
