//! Adapter metrics (prometheus collectors)
//!
//! Fire-and-forget telemetry; absence of a scrape endpoint is tolerated.

use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, register_int_gauge_vec,
    CounterVec, HistogramVec, IntGauge, IntGaugeVec,
};

lazy_static::lazy_static! {
    /// Operation counter labelled by adapter, operation and outcome
    pub static ref ADAPTER_OPERATIONS_TOTAL: CounterVec = register_counter_vec!(
        "adapter_operations_total",
        "Total adapter operations",
        &["adapter", "operation", "status"]
    )
    .unwrap();

    /// Operation duration histogram in seconds
    pub static ref ADAPTER_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "adapter_operation_duration_seconds",
        "Adapter operation duration",
        &["adapter", "operation"]
    )
    .unwrap();

    /// Per-adapter circuit breaker state gauge
    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        "adapter_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=half-open, 2=open)",
        &["adapter"]
    )
    .unwrap();

    /// Count of adapters currently registered for monitoring
    pub static ref REGISTERED_ADAPTERS: IntGauge = register_int_gauge!(
        "adapter_registered_total",
        "Currently registered adapter instances"
    )
    .unwrap();
}
