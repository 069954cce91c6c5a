//! Adapter monitoring and alerting
//!
//! Aggregates success/failure counters and durations per adapter instance,
//! runs periodic health checks and raises alerts on error-rate or
//! inactivity thresholds. Alert handler failures are logged and isolated,
//! never propagated to the operation caller.

use crate::metrics::REGISTERED_ADAPTERS;
use crate::types::AdapterIdentity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Monitoring configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Interval between health-check sweeps
    pub health_check_interval: Duration,
    /// Inactivity window before a WARNING alert
    pub inactivity_threshold: Duration,
    /// Error-rate percentage raising a WARNING
    pub error_rate_warning: f64,
    /// Error-rate percentage raising a CRITICAL
    pub error_rate_critical: f64,
    /// Consecutive failures raising a CRITICAL
    pub consecutive_failure_threshold: u32,
    /// Retention window for stale metrics
    pub metrics_retention: Duration,
    /// Interval between metrics-cleanup sweeps
    pub cleanup_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(crate::DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            inactivity_threshold: Duration::from_secs(30 * 60),
            error_rate_warning: 20.0,
            error_rate_critical: 50.0,
            consecutive_failure_threshold: 5,
            metrics_retention: Duration::from_secs(crate::DEFAULT_METRICS_RETENTION_SECS),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Per-adapter operation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMetrics {
    /// Total operations
    pub total_operations: u64,
    /// Successful operations
    pub successful_operations: u64,
    /// Failed operations
    pub failed_operations: u64,
    /// Sum of operation durations in milliseconds
    pub total_duration_ms: u64,
    /// Consecutive failures since the last success
    pub consecutive_failures: u32,
    /// Last recorded activity
    pub last_activity: Option<DateTime<Utc>>,
    /// Most recent fault text
    pub last_error: Option<String>,
}

impl AdapterMetrics {
    fn zeroed() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            total_duration_ms: 0,
            consecutive_failures: 0,
            last_activity: Some(Utc::now()),
            last_error: None,
        }
    }

    /// Success rate as a percentage; 100 when nothing has run yet
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 100.0;
        }
        self.successful_operations as f64 / self.total_operations as f64 * 100.0
    }

    /// Error rate as a percentage
    pub fn error_rate(&self) -> f64 {
        100.0 - self.success_rate()
    }

    /// Average operation duration in milliseconds
    pub fn avg_duration_ms(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.total_operations as f64
    }
}

/// Last-known health judgment for an adapter instance, derived exclusively
/// from the most recent recorded success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterHealth {
    /// Healthy flag
    pub healthy: bool,
    /// Last update time
    pub last_update: DateTime<Utc>,
    /// Most recent error message
    pub last_error_message: Option<String>,
    /// Most recent error time
    pub last_error_at: Option<DateTime<Utc>>,
}

impl AdapterHealth {
    fn healthy() -> Self {
        Self {
            healthy: true,
            last_update: Utc::now(),
            last_error_message: None,
            last_error_at: None,
        }
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    /// Informational
    Info,
    /// Degraded but operational
    Warning,
    /// Requires immediate attention
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "INFO"),
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Transient alert delivered to registered handlers, not persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Alert id
    pub alert_id: Uuid,
    /// Severity
    pub level: AlertLevel,
    /// Adapter key the alert concerns
    pub adapter: String,
    /// Message
    pub message: String,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

/// Alert sink. Failures are logged and isolated.
pub trait AlertHandler: Send + Sync {
    /// Handle one alert
    fn on_alert(&self, alert: &AlertEvent) -> anyhow::Result<()>;
}

/// Monitoring service owning the per-adapter metrics and health registries
/// and the two background schedulers (health checks, metrics cleanup).
pub struct MonitoringService {
    config: MonitoringConfig,
    metrics: DashMap<String, AdapterMetrics>,
    health: DashMap<String, AdapterHealth>,
    handlers: DashMap<String, Arc<dyn AlertHandler>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl MonitoringService {
    /// Create a monitoring service; background loops start with [`start`](Self::start)
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            metrics: DashMap::new(),
            health: DashMap::new(),
            handlers: DashMap::new(),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register an adapter: zeroed metrics, healthy status
    pub fn register_adapter(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        self.metrics.insert(key.clone(), AdapterMetrics::zeroed());
        self.health.insert(key.clone(), AdapterHealth::healthy());
        REGISTERED_ADAPTERS.set(self.metrics.len() as i64);
        info!("Adapter {} registered for monitoring", key);
    }

    /// Unregister an adapter and drop its state
    pub fn unregister_adapter(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        self.metrics.remove(&key);
        self.health.remove(&key);
        REGISTERED_ADAPTERS.set(self.metrics.len() as i64);
        info!("Adapter {} unregistered from monitoring", key);
    }

    /// Record a successful operation
    pub fn record_success(&self, identity: &AdapterIdentity, duration: Duration) {
        let key = identity.key();
        let mut metrics = self
            .metrics
            .entry(key.clone())
            .or_insert_with(AdapterMetrics::zeroed);
        metrics.total_operations += 1;
        metrics.successful_operations += 1;
        metrics.total_duration_ms += duration.as_millis() as u64;
        metrics.consecutive_failures = 0;
        metrics.last_activity = Some(Utc::now());
        drop(metrics);

        let mut health = self.health.entry(key).or_insert_with(AdapterHealth::healthy);
        health.healthy = true;
        health.last_update = Utc::now();
    }

    /// Record a failed operation
    pub fn record_failure(&self, identity: &AdapterIdentity, duration: Duration, error: &str) {
        let key = identity.key();
        let mut metrics = self
            .metrics
            .entry(key.clone())
            .or_insert_with(AdapterMetrics::zeroed);
        metrics.total_operations += 1;
        metrics.failed_operations += 1;
        metrics.total_duration_ms += duration.as_millis() as u64;
        metrics.consecutive_failures += 1;
        metrics.last_activity = Some(Utc::now());
        metrics.last_error = Some(error.to_string());
        drop(metrics);

        let now = Utc::now();
        let mut health = self.health.entry(key).or_insert_with(AdapterHealth::healthy);
        health.healthy = false;
        health.last_update = now;
        health.last_error_message = Some(error.to_string());
        health.last_error_at = Some(now);
    }

    /// Metrics snapshot for one adapter
    pub fn metrics(&self, identity: &AdapterIdentity) -> Option<AdapterMetrics> {
        self.metrics.get(&identity.key()).map(|m| m.clone())
    }

    /// Health snapshot for one adapter
    pub fn health(&self, identity: &AdapterIdentity) -> Option<AdapterHealth> {
        self.health.get(&identity.key()).map(|h| h.clone())
    }

    /// Snapshot of all per-adapter metrics
    pub fn all_metrics(&self) -> HashMap<String, AdapterMetrics> {
        self.metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Register an alert handler under a unique name
    pub fn register_alert_handler(&self, name: impl Into<String>, handler: Arc<dyn AlertHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Unregister an alert handler
    pub fn unregister_alert_handler(&self, name: &str) {
        self.handlers.remove(name);
    }

    /// Raise an alert to every registered handler. Handler failures are
    /// logged, never propagated.
    pub fn raise_alert(&self, level: AlertLevel, adapter: &str, message: impl Into<String>) {
        let alert = AlertEvent {
            alert_id: Uuid::new_v4(),
            level,
            adapter: adapter.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        match level {
            AlertLevel::Info => info!("[{}] {}: {}", level, adapter, alert.message),
            AlertLevel::Warning => warn!("[{}] {}: {}", level, adapter, alert.message),
            AlertLevel::Critical => error!("[{}] {}: {}", level, adapter, alert.message),
        }
        for handler in self.handlers.iter() {
            if let Err(e) = handler.value().on_alert(&alert) {
                warn!("Alert handler {} failed: {}", handler.key(), e);
            }
        }
    }

    /// Run one health-check sweep over all registered adapters
    pub fn run_health_checks(&self) {
        let now = Utc::now();
        for entry in self.metrics.iter() {
            let key = entry.key();
            let metrics = entry.value();

            if let Some(last_activity) = metrics.last_activity {
                let idle = now.signed_duration_since(last_activity);
                if idle.num_seconds() > self.config.inactivity_threshold.as_secs() as i64 {
                    self.raise_alert(
                        AlertLevel::Warning,
                        key,
                        format!("no activity for {} minutes", idle.num_minutes()),
                    );
                }
            }

            if metrics.total_operations > 0 {
                let error_rate = metrics.error_rate();
                if error_rate > self.config.error_rate_critical {
                    self.raise_alert(
                        AlertLevel::Critical,
                        key,
                        format!("error rate {:.1}%", error_rate),
                    );
                } else if error_rate > self.config.error_rate_warning {
                    self.raise_alert(
                        AlertLevel::Warning,
                        key,
                        format!("error rate {:.1}%", error_rate),
                    );
                }
            }

            if metrics.consecutive_failures >= self.config.consecutive_failure_threshold {
                self.raise_alert(
                    AlertLevel::Critical,
                    key,
                    format!("{} consecutive failures", metrics.consecutive_failures),
                );
            }
        }
    }

    /// Purge metrics with no activity inside the retention window
    pub fn cleanup_stale_metrics(&self) {
        let now = Utc::now();
        let retention_secs = self.config.metrics_retention.as_secs() as i64;
        let before = self.metrics.len();
        self.metrics.retain(|_, metrics| match metrics.last_activity {
            Some(at) => now.signed_duration_since(at).num_seconds() <= retention_secs,
            None => false,
        });
        let purged = before.saturating_sub(self.metrics.len());
        if purged > 0 {
            self.health.retain(|key, _| self.metrics.contains_key(key));
            REGISTERED_ADAPTERS.set(self.metrics.len() as i64);
            info!("Purged {} stale adapter metrics", purged);
        }
    }

    /// Start the health-check and cleanup schedulers on a small shared
    /// task set serving all adapters.
    pub fn start(self: &Arc<Self>) {
        let service = Arc::clone(self);
        let token = self.shutdown.clone();
        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(service.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first immediate tick is skipped; adapters register lazily
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => service.run_health_checks(),
                }
            }
        });

        let service = Arc::clone(self);
        let token = self.shutdown.clone();
        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(service.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => service.cleanup_stale_metrics(),
                }
            }
        });
        info!(
            "Monitoring started (health check every {:?}, cleanup every {:?})",
            self.config.health_check_interval, self.config.cleanup_interval
        );
    }

    /// Stop the schedulers, waiting up to 10 seconds before abandoning them
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        let wait = Duration::from_secs(crate::MONITOR_SHUTDOWN_WAIT_SECS);
        if tokio::time::timeout(wait, self.tasks.wait()).await.is_err() {
            warn!("Monitoring tasks still running after {:?}, abandoning", wait);
        }
        info!("Monitoring stopped");
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&self, identity: &AdapterIdentity, age: Duration) {
        if let Some(mut metrics) = self.metrics.get_mut(&identity.key()) {
            metrics.last_activity =
                Some(Utc::now() - chrono::Duration::seconds(age.as_secs() as i64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdapterMode;
    use parking_lot::Mutex;

    struct CapturingHandler(Mutex<Vec<AlertEvent>>);

    impl AlertHandler for CapturingHandler {
        fn on_alert(&self, alert: &AlertEvent) -> anyhow::Result<()> {
            self.0.lock().push(alert.clone());
            Ok(())
        }
    }

    struct FailingHandler;

    impl AlertHandler for FailingHandler {
        fn on_alert(&self, _alert: &AlertEvent) -> anyhow::Result<()> {
            anyhow::bail!("handler crashed")
        }
    }

    fn identity() -> AdapterIdentity {
        AdapterIdentity::new("file", AdapterMode::Outbound, "mon-test")
    }

    #[test]
    fn test_registration_zeroes_state() {
        let service = MonitoringService::new(MonitoringConfig::default());
        let id = identity();
        service.register_adapter(&id);

        let metrics = service.metrics(&id).unwrap();
        assert_eq!(metrics.total_operations, 0);
        assert_eq!(metrics.success_rate(), 100.0);
        assert!(service.health(&id).unwrap().healthy);

        service.unregister_adapter(&id);
        assert!(service.metrics(&id).is_none());
        assert!(service.health(&id).is_none());
    }

    #[test]
    fn test_recording_updates_metrics_and_health() {
        let service = MonitoringService::new(MonitoringConfig::default());
        let id = identity();
        service.register_adapter(&id);

        service.record_success(&id, Duration::from_millis(100));
        service.record_failure(&id, Duration::from_millis(300), "boom");

        let metrics = service.metrics(&id).unwrap();
        assert_eq!(metrics.total_operations, 2);
        assert_eq!(metrics.successful_operations, 1);
        assert_eq!(metrics.failed_operations, 1);
        assert_eq!(metrics.total_duration_ms, 400);
        assert_eq!(metrics.consecutive_failures, 1);
        assert_eq!(metrics.success_rate(), 50.0);
        assert_eq!(metrics.avg_duration_ms(), 200.0);
        assert_eq!(metrics.last_error.as_deref(), Some("boom"));

        let health = service.health(&id).unwrap();
        assert!(!health.healthy);
        assert_eq!(health.last_error_message.as_deref(), Some("boom"));

        // A success flips health back
        service.record_success(&id, Duration::from_millis(50));
        assert!(service.health(&id).unwrap().healthy);
        assert_eq!(service.metrics(&id).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_health_check_alerts() {
        let service = MonitoringService::new(MonitoringConfig::default());
        let id = identity();
        let captured = Arc::new(CapturingHandler(Mutex::new(Vec::new())));
        service.register_alert_handler("failing", Arc::new(FailingHandler));
        service.register_alert_handler("capturing", captured.clone());
        service.register_adapter(&id);

        // 1 success, 4 failures: 80% error rate and 4 consecutive failures
        service.record_success(&id, Duration::from_millis(10));
        for _ in 0..4 {
            service.record_failure(&id, Duration::from_millis(10), "down");
        }
        service.run_health_checks();

        let alerts = captured.0.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].message.contains("error rate"));
        assert_eq!(alerts[0].adapter, id.key());
    }

    #[test]
    fn test_consecutive_failure_alert() {
        let service = MonitoringService::new(MonitoringConfig {
            // Rate thresholds out of the way; only the consecutive check fires
            error_rate_warning: 101.0,
            error_rate_critical: 101.0,
            ..MonitoringConfig::default()
        });
        let id = identity();
        let captured = Arc::new(CapturingHandler(Mutex::new(Vec::new())));
        service.register_alert_handler("capturing", captured.clone());
        service.register_adapter(&id);

        for _ in 0..5 {
            service.record_failure(&id, Duration::from_millis(10), "down");
        }
        service.run_health_checks();

        let alerts = captured.0.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].message.contains("consecutive failures"));
    }

    #[test]
    fn test_inactivity_alert() {
        let service = MonitoringService::new(MonitoringConfig::default());
        let id = identity();
        let captured = Arc::new(CapturingHandler(Mutex::new(Vec::new())));
        service.register_alert_handler("capturing", captured.clone());
        service.register_adapter(&id);
        service.backdate_activity(&id, Duration::from_secs(31 * 60));

        service.run_health_checks();

        let alerts = captured.0.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert!(alerts[0].message.contains("no activity"));
    }

    #[test]
    fn test_cleanup_purges_stale_metrics() {
        let service = MonitoringService::new(MonitoringConfig::default());
        let stale = AdapterIdentity::new("file", AdapterMode::Outbound, "stale");
        let fresh = AdapterIdentity::new("file", AdapterMode::Outbound, "fresh");
        service.register_adapter(&stale);
        service.register_adapter(&fresh);
        service.backdate_activity(&stale, Duration::from_secs(25 * 60 * 60));

        service.cleanup_stale_metrics();

        assert!(service.metrics(&stale).is_none());
        assert!(service.health(&stale).is_none());
        assert!(service.metrics(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let service = Arc::new(MonitoringService::new(MonitoringConfig::default()));
        service.start();
        service.shutdown().await;
    }
}
