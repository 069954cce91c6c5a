//! Inbound dispatch: push-style adapters
//!
//! An inbound adapter pushes payloads into its external system. It offers
//! a synchronous `send`, a fire-and-forget `send_async` resolved through a
//! callback on the adapter's worker pool, and a best-effort `send_batch`.

use crate::lifecycle::{AdapterCore, Connector};
use crate::monitoring::MonitoringService;
use crate::pipeline::ResiliencePipeline;
use crate::result::{OperationResult, OperationStatus};
use crate::types::{AdapterCallback, AdapterIdentity};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Hook contract for push connectors
#[async_trait]
pub trait InboundConnector: Connector {
    /// Deliver one payload to the external system. Returns an optional
    /// acknowledgment payload.
    async fn send(
        &self,
        payload: &Value,
        headers: &HashMap<String, String>,
    ) -> Result<Option<Value>>;

    /// Whether the protocol supports native batch delivery. When false,
    /// the dispatcher sends items one at a time.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Native batch delivery; only called when [`supports_batch`](Self::supports_batch)
    /// returns true.
    async fn send_all(&self, payloads: &[Value]) -> Result<Option<Value>> {
        let _ = payloads;
        Err(Error::Adapter("native batch delivery not supported".into()))
    }
}

/// Push-style adapter: an [`AdapterCore`] composed with an
/// [`InboundConnector`].
pub struct InboundAdapter {
    core: Arc<AdapterCore>,
    connector: Arc<dyn InboundConnector>,
}

impl InboundAdapter {
    /// Create an adapter around the given connector
    pub fn new(
        identity: AdapterIdentity,
        connector: Arc<dyn InboundConnector>,
        pipeline: Arc<ResiliencePipeline>,
        monitoring: Option<Arc<MonitoringService>>,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(identity, pipeline, monitoring)),
            connector,
        }
    }

    /// The shared lifecycle component
    pub fn core(&self) -> &AdapterCore {
        &self.core
    }

    /// Initialize the adapter (runs the connector's `connect` hook)
    pub async fn initialize(&self) -> Result<()> {
        self.core.initialize(self.connector.connect()).await
    }

    /// Destroy the adapter (runs the connector's `disconnect` hook)
    pub async fn destroy(&self) -> Result<()> {
        self.core.destroy(self.connector.disconnect()).await
    }

    /// Probe connectivity, bypassing the resilience pipeline
    pub async fn test_connection(&self) -> Result<OperationResult> {
        self.core
            .test_connection(self.connector.check_connection())
            .await
    }

    async fn dispatch_send(
        core: &AdapterCore,
        connector: &Arc<dyn InboundConnector>,
        payload: Value,
        headers: HashMap<String, String>,
    ) -> OperationResult {
        let connector = Arc::clone(connector);
        let payload = Arc::new(payload);
        let headers = Arc::new(headers);
        core.pipeline()
            .execute(core.identity(), "send", move || {
                let connector = Arc::clone(&connector);
                let payload = Arc::clone(&payload);
                let headers = Arc::clone(&headers);
                async move { connector.send(&payload, &headers).await }.boxed()
            })
            .await
    }

    /// Send one payload through the resilience pipeline
    pub async fn send(
        &self,
        payload: Value,
        headers: HashMap<String, String>,
    ) -> Result<OperationResult> {
        self.core.validate_ready()?;
        Ok(Self::dispatch_send(&self.core, &self.connector, payload, headers).await)
    }

    /// Fire-and-forget send on the adapter's worker pool. Readiness is
    /// checked once at admission; an admitted send runs to completion even
    /// when teardown starts, since destroy waits for the pool to drain.
    /// Exactly one callback method is invoked per call.
    pub fn send_async(
        &self,
        payload: Value,
        headers: HashMap<String, String>,
        callback: Arc<dyn AdapterCallback>,
    ) -> Result<()> {
        self.core.validate_ready()?;
        let core = Arc::clone(&self.core);
        let connector = Arc::clone(&self.connector);
        self.core.spawn(async move {
            let result = Self::dispatch_send(&core, &connector, payload, headers).await;
            if result.is_failure() {
                callback.on_failure(result);
            } else {
                callback.on_success(result);
            }
        });
        Ok(())
    }

    /// Best-effort batch send. The default policy sends items one at a
    /// time and returns SUCCESS only when all items succeeded, FAILURE
    /// only when all failed, and PARTIAL_SUCCESS otherwise; connectors
    /// with native batch protocols override [`InboundConnector::send_all`].
    pub async fn send_batch(&self, payloads: Vec<Value>) -> Result<OperationResult> {
        self.core.validate_ready()?;
        let total = payloads.len();

        if self.connector.supports_batch() {
            let connector = Arc::clone(&self.connector);
            let payloads = Arc::new(payloads);
            let result = self
                .core
                .pipeline()
                .execute(self.core.identity(), "send_batch", move || {
                    let connector = Arc::clone(&connector);
                    let payloads = Arc::clone(&payloads);
                    async move { connector.send_all(&payloads).await }.boxed()
                })
                .await;
            let failed = result.is_failure();
            return Ok(result
                .with_metadata("success_count", if failed { 0 } else { total })
                .with_metadata("failure_count", if failed { total } else { 0 })
                .with_metadata("total_count", total));
        }

        let start = Instant::now();
        let mut success_count = 0usize;
        let mut failure_count = 0usize;
        for payload in payloads {
            let result =
                Self::dispatch_send(&self.core, &self.connector, payload, HashMap::new()).await;
            if result.is_success() {
                success_count += 1;
            } else {
                failure_count += 1;
            }
        }

        let (status, message) = if failure_count == 0 {
            (OperationStatus::Success, format!("all {} items sent", total))
        } else if success_count == 0 {
            (OperationStatus::Failure, format!("all {} items failed", total))
        } else {
            (
                OperationStatus::PartialSuccess,
                format!("{} of {} items sent", success_count, total),
            )
        };

        let mut result = match status {
            OperationStatus::Success => OperationResult::success(message),
            OperationStatus::PartialSuccess => OperationResult::partial_success(message),
            _ => OperationResult::failure(message, "batch send failed"),
        };
        result = result
            .with_metadata("operation", "send_batch")
            .with_metadata("success_count", success_count)
            .with_metadata("failure_count", failure_count)
            .with_metadata("total_count", total)
            .with_duration(start.elapsed());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
    use crate::classifier::ErrorHandler;
    use crate::types::AdapterMode;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedConnector {
        /// Indexes of payloads that should fail (by call order)
        fail_on: Vec<u32>,
        calls: AtomicU32,
    }

    impl ScriptedConnector {
        fn new(fail_on: Vec<u32>) -> Self {
            Self {
                fail_on,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
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
    impl InboundConnector for ScriptedConnector {
        async fn send(
            &self,
            payload: &Value,
            _headers: &HashMap<String, String>,
        ) -> Result<Option<Value>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                // Validation faults are never retried, keeping call counts stable
                Err(Error::Validation("rejected".into()))
            } else {
                Ok(Some(payload.clone()))
            }
        }
    }

    fn adapter(connector: Arc<dyn InboundConnector>) -> InboundAdapter {
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
        let errors = Arc::new(ErrorHandler::new(Arc::clone(&breakers)));
        let pipeline = Arc::new(ResiliencePipeline::new(breakers, errors, None, None));
        InboundAdapter::new(
            AdapterIdentity::new("http", AdapterMode::Inbound, "in-test"),
            connector,
            pipeline,
            None,
        )
    }

    struct CapturingCallback(Mutex<Vec<OperationResult>>);

    impl AdapterCallback for CapturingCallback {
        fn on_success(&self, result: OperationResult) {
            self.0.lock().push(result);
        }
        fn on_failure(&self, result: OperationResult) {
            self.0.lock().push(result);
        }
    }

    #[tokio::test]
    async fn test_send_requires_ready() {
        let adapter = adapter(Arc::new(ScriptedConnector::new(vec![])));
        let result = adapter
            .send(serde_json::json!({"id": 1}), HashMap::new())
            .await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_send_returns_ack() {
        let adapter = adapter(Arc::new(ScriptedConnector::new(vec![])));
        adapter.initialize().await.unwrap();

        let result = adapter
            .send(serde_json::json!({"id": 1}), HashMap::new())
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.data, Some(serde_json::json!({"id": 1})));
    }

    #[tokio::test]
    async fn test_send_batch_partial_success() {
        // 5 payloads, calls 1 and 3 fail
        let adapter = adapter(Arc::new(ScriptedConnector::new(vec![1, 3])));
        adapter.initialize().await.unwrap();

        let payloads: Vec<Value> = (0..5).map(|i| serde_json::json!({ "id": i })).collect();
        let result = adapter.send_batch(payloads).await.unwrap();

        assert_eq!(result.status, OperationStatus::PartialSuccess);
        assert_eq!(result.metadata["success_count"], serde_json::json!(3));
        assert_eq!(result.metadata["failure_count"], serde_json::json!(2));
        assert_eq!(result.metadata["total_count"], serde_json::json!(5));
    }

    #[tokio::test]
    async fn test_send_batch_all_outcomes() {
        let adapter_ok = adapter(Arc::new(ScriptedConnector::new(vec![])));
        adapter_ok.initialize().await.unwrap();
        let result = adapter_ok
            .send_batch(vec![serde_json::json!(1), serde_json::json!(2)])
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Success);

        let adapter_bad = adapter(Arc::new(ScriptedConnector::new(vec![0, 1])));
        adapter_bad.initialize().await.unwrap();
        let result = adapter_bad
            .send_batch(vec![serde_json::json!(1), serde_json::json!(2)])
            .await
            .unwrap();
        assert_eq!(result.status, OperationStatus::Failure);
    }

    #[tokio::test]
    async fn test_send_async_always_invokes_callback() {
        let adapter = adapter(Arc::new(ScriptedConnector::new(vec![1])));
        adapter.initialize().await.unwrap();
        let callback = Arc::new(CapturingCallback(Mutex::new(Vec::new())));

        adapter
            .send_async(serde_json::json!({"id": 0}), HashMap::new(), callback.clone())
            .unwrap();
        adapter
            .send_async(serde_json::json!({"id": 1}), HashMap::new(), callback.clone())
            .unwrap();

        // destroy waits for the worker pool to drain
        adapter.destroy().await.unwrap();

        let results = callback.0.lock();
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_failure()).count(), 1);
    }

    #[tokio::test]
    async fn test_admitted_async_send_completes_during_teardown() {
        let adapter = adapter(Arc::new(ScriptedConnector::new(vec![])));
        adapter.initialize().await.unwrap();
        let callback = Arc::new(CapturingCallback(Mutex::new(Vec::new())));

        adapter
            .send_async(serde_json::json!({"id": 7}), HashMap::new(), callback.clone())
            .unwrap();
        // Teardown starts right away; the admitted send must still run to
        // completion instead of being failed by the deactivated adapter
        adapter.destroy().await.unwrap();

        let results = callback.0.lock();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
    }

    struct NativeBatchConnector {
        fail: bool,
    }

    #[async_trait]
    impl Connector for NativeBatchConnector {
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
    impl InboundConnector for NativeBatchConnector {
        async fn send(
            &self,
            _payload: &Value,
            _headers: &HashMap<String, String>,
        ) -> Result<Option<Value>> {
            panic!("per-item send must not be used with native batch")
        }

        fn supports_batch(&self) -> bool {
            true
        }

        async fn send_all(&self, payloads: &[Value]) -> Result<Option<Value>> {
            if self.fail {
                return Err(Error::Validation("batch rejected".into()));
            }
            Ok(Some(serde_json::json!({ "delivered": payloads.len() })))
        }
    }

    #[tokio::test]
    async fn test_native_batch_override() {
        let adapter = adapter(Arc::new(NativeBatchConnector { fail: false }));
        adapter.initialize().await.unwrap();

        let result = adapter
            .send_batch(vec![serde_json::json!(1), serde_json::json!(2)])
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.data, Some(serde_json::json!({"delivered": 2})));
        assert_eq!(result.metadata["success_count"], serde_json::json!(2));
        assert_eq!(result.metadata["failure_count"], serde_json::json!(0));
        assert_eq!(result.metadata["total_count"], serde_json::json!(2));
    }

    #[tokio::test]
    async fn test_native_batch_failure_counts() {
        let adapter = adapter(Arc::new(NativeBatchConnector { fail: true }));
        adapter.initialize().await.unwrap();

        let result = adapter
            .send_batch(vec![
                serde_json::json!(1),
                serde_json::json!(2),
                serde_json::json!(3),
            ])
            .await
            .unwrap();
        assert!(result.is_failure());
        assert_eq!(result.metadata["success_count"], serde_json::json!(0));
        assert_eq!(result.metadata["failure_count"], serde_json::json!(3));
        assert_eq!(result.metadata["total_count"], serde_json::json!(3));
    }
}
