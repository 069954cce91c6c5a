//! End-to-end tests for the resilience pipeline and dispatch paths

use adapter_core::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
use adapter_core::classifier::{ErrorClassification, ErrorHandler};
use adapter_core::{
    AdapterIdentity, AdapterMode, Connector, Error, InboundAdapter, InboundConnector,
    MonitoringConfig, MonitoringService, ResiliencePipeline, Result,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connector that fails with a connection fault until told to recover
struct FlakyConnector {
    healthy: AtomicBool,
    sends: AtomicU32,
}

impl FlakyConnector {
    fn new(healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(healthy),
            sends: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl InboundConnector for FlakyConnector {
    async fn send(
        &self,
        payload: &Value,
        _headers: &HashMap<String, String>,
    ) -> Result<Option<Value>> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(Some(payload.clone()))
        } else {
            Err(Error::Connection("endpoint unreachable".into()))
        }
    }
}

fn build_adapter(
    connector: Arc<FlakyConnector>,
    breaker_config: CircuitBreakerConfig,
    monitoring: Option<Arc<MonitoringService>>,
) -> (InboundAdapter, Arc<CircuitBreakerRegistry>, Arc<ErrorHandler>) {
    let breakers = Arc::new(CircuitBreakerRegistry::new(breaker_config));
    let errors = Arc::new(ErrorHandler::new(Arc::clone(&breakers)));
    let pipeline = Arc::new(ResiliencePipeline::new(
        Arc::clone(&breakers),
        Arc::clone(&errors),
        None,
        monitoring.clone(),
    ));
    let adapter = InboundAdapter::new(
        AdapterIdentity::new("http", AdapterMode::Inbound, "flaky-1"),
        connector,
        pipeline,
        monitoring,
    );
    (adapter, breakers, errors)
}

#[tokio::test(start_paused = true)]
async fn circuit_trips_after_five_connection_faults() {
    let connector = Arc::new(FlakyConnector::new(false));
    let (adapter, breakers, errors) = build_adapter(
        Arc::clone(&connector),
        CircuitBreakerConfig::default(),
        None,
    );
    adapter.initialize().await.unwrap();
    let identity = adapter.core().identity().clone();

    // First send: initial attempt plus 3 retries, 4 qualifying faults
    let result = adapter.send(json!({"n": 1}), HashMap::new()).await.unwrap();
    assert!(result.is_failure());
    assert_eq!(connector.sends.load(Ordering::SeqCst), 4);
    assert_eq!(breakers.state(&identity), CircuitState::Closed);

    // Second send: the 5th fault trips the breaker, the retry loop aborts
    let result = adapter.send(json!({"n": 2}), HashMap::new()).await.unwrap();
    assert!(result.is_failure());
    assert_eq!(connector.sends.load(Ordering::SeqCst), 5);
    assert_eq!(breakers.state(&identity), CircuitState::Open);

    // Third send: short-circuits without invoking the connector
    let result = adapter.send(json!({"n": 3}), HashMap::new()).await.unwrap();
    assert!(result.is_failure());
    assert_eq!(result.message, "circuit breaker open");
    assert_eq!(connector.sends.load(Ordering::SeqCst), 5);

    // Error statistics accumulated one entry per fault
    let stats = errors.statistics(&identity).unwrap();
    assert_eq!(stats.counts[&ErrorClassification::Connection], 5);
    assert_eq!(stats.total, 5);
}

#[tokio::test]
async fn half_open_trial_success_closes_breaker() {
    let connector = Arc::new(FlakyConnector::new(true));
    let (adapter, breakers, _errors) = build_adapter(
        Arc::clone(&connector),
        CircuitBreakerConfig {
            failure_threshold: 5,
            open_timeout_ms: 50,
        },
        None,
    );
    adapter.initialize().await.unwrap();
    let identity = adapter.core().identity().clone();

    for _ in 0..5 {
        breakers.record_failure(&identity);
    }
    assert_eq!(breakers.state(&identity), CircuitState::Open);

    // Once the open timeout elapses the next call goes through as a trial
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(breakers.state(&identity), CircuitState::HalfOpen);

    let result = adapter.send(json!({"n": 1}), HashMap::new()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(connector.sends.load(Ordering::SeqCst), 1);
    assert_eq!(breakers.state(&identity), CircuitState::Closed);
    assert_eq!(breakers.consecutive_failures(&identity), 0);
}

#[tokio::test]
async fn pipeline_feeds_monitoring() {
    let connector = Arc::new(FlakyConnector::new(true));
    let monitoring = Arc::new(MonitoringService::new(MonitoringConfig::default()));
    let (adapter, _breakers, _errors) = build_adapter(
        Arc::clone(&connector),
        CircuitBreakerConfig::default(),
        Some(Arc::clone(&monitoring)),
    );
    adapter.initialize().await.unwrap();
    let identity = adapter.core().identity().clone();

    assert!(monitoring.health(&identity).unwrap().healthy);

    adapter.send(json!({"n": 1}), HashMap::new()).await.unwrap();
    adapter.send(json!({"n": 2}), HashMap::new()).await.unwrap();

    let metrics = monitoring.metrics(&identity).unwrap();
    assert_eq!(metrics.total_operations, 2);
    assert_eq!(metrics.successful_operations, 2);
    assert_eq!(metrics.success_rate(), 100.0);

    // Destroy unregisters the adapter from monitoring
    adapter.destroy().await.unwrap();
    assert!(monitoring.metrics(&identity).is_none());
    assert!(monitoring.health(&identity).is_none());
}

#[tokio::test(start_paused = true)]
async fn monitoring_records_pipeline_failures() {
    let connector = Arc::new(FlakyConnector::new(false));
    let monitoring = Arc::new(MonitoringService::new(MonitoringConfig::default()));
    let (adapter, _breakers, _errors) = build_adapter(
        Arc::clone(&connector),
        CircuitBreakerConfig::default(),
        Some(Arc::clone(&monitoring)),
    );
    adapter.initialize().await.unwrap();
    let identity = adapter.core().identity().clone();

    let result = adapter.send(json!({"n": 1}), HashMap::new()).await.unwrap();
    assert!(result.is_failure());

    let metrics = monitoring.metrics(&identity).unwrap();
    assert_eq!(metrics.failed_operations, 1);
    assert_eq!(metrics.consecutive_failures, 1);
    assert!(!monitoring.health(&identity).unwrap().healthy);
    assert!(monitoring
        .health(&identity)
        .unwrap()
        .last_error_message
        .unwrap()
        .contains("endpoint unreachable"));
}

#[tokio::test]
async fn lifecycle_is_idempotent_end_to_end() {
    let connector = Arc::new(FlakyConnector::new(true));
    let (adapter, _breakers, _errors) = build_adapter(
        Arc::clone(&connector),
        CircuitBreakerConfig::default(),
        None,
    );

    // Destroy before initialize is a no-op
    adapter.destroy().await.unwrap();

    adapter.initialize().await.unwrap();
    adapter.initialize().await.unwrap();
    assert!(adapter.core().is_active());

    let result = adapter.test_connection().await.unwrap();
    assert!(result.is_success());

    adapter.destroy().await.unwrap();
    assert!(!adapter.core().is_initialized());
    assert!(matches!(
        adapter.send(json!({}), HashMap::new()).await,
        Err(Error::NotInitialized(_))
    ));
}
