//! Outbound dispatch: pull-style adapters
//!
//! An outbound adapter pulls messages from its external system: one-shot
//! `receive`, bounded `receive_batch`, continuous scheduled polling with a
//! callback, and acknowledgment. Polling for one adapter runs on a single
//! dedicated task, so ticks never overlap.

use crate::lifecycle::{AdapterCore, Connector};
use crate::monitoring::MonitoringService;
use crate::pipeline::ResiliencePipeline;
use crate::result::OperationResult;
use crate::types::{AdapterCallback, AdapterIdentity};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hook contract for pull connectors
#[async_trait]
pub trait OutboundConnector: Connector {
    /// Pull one message matching the optional criteria. `Ok(None)` means
    /// no data was available, which is not a failure.
    async fn receive(&self, criteria: Option<&Value>) -> Result<Option<Value>>;

    /// Whether the protocol supports native batch receive
    fn supports_batch(&self) -> bool {
        false
    }

    /// Native batch receive; only called when [`supports_batch`](Self::supports_batch)
    /// returns true.
    async fn receive_all(&self, max_items: usize) -> Result<Vec<Value>> {
        let _ = max_items;
        Err(Error::Adapter("native batch receive not supported".into()))
    }

    /// Acknowledge a processed message. Default is a no-op; systems with
    /// explicit ack semantics override this.
    async fn acknowledge(&self, message_id: &str) -> Result<()> {
        let _ = message_id;
        Ok(())
    }

    /// Polling interval in milliseconds; must be positive to start polling
    fn polling_interval_ms(&self) -> u64;
}

/// Pull-style adapter: an [`AdapterCore`] composed with an
/// [`OutboundConnector`].
pub struct OutboundAdapter {
    core: Arc<AdapterCore>,
    connector: Arc<dyn OutboundConnector>,
    polling: Mutex<Option<CancellationToken>>,
}

impl OutboundAdapter {
    /// Create an adapter around the given connector
    pub fn new(
        identity: AdapterIdentity,
        connector: Arc<dyn OutboundConnector>,
        pipeline: Arc<ResiliencePipeline>,
        monitoring: Option<Arc<MonitoringService>>,
    ) -> Self {
        Self {
            core: Arc::new(AdapterCore::new(identity, pipeline, monitoring)),
            connector,
            polling: Mutex::new(None),
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

    /// Stop polling, then destroy the adapter (runs the `disconnect` hook)
    pub async fn destroy(&self) -> Result<()> {
        self.stop_polling();
        self.core.destroy(self.connector.disconnect()).await
    }

    /// Probe connectivity, bypassing the resilience pipeline
    pub async fn test_connection(&self) -> Result<OperationResult> {
        self.core
            .test_connection(self.connector.check_connection())
            .await
    }

    /// One-shot pull through the resilience pipeline
    pub async fn receive(&self, criteria: Option<Value>) -> Result<OperationResult> {
        self.core.validate_ready()?;
        let connector = Arc::clone(&self.connector);
        let criteria = Arc::new(criteria);
        let result = self
            .core
            .pipeline()
            .execute(self.core.identity(), "receive", move || {
                let connector = Arc::clone(&connector);
                let criteria = Arc::clone(&criteria);
                async move { connector.receive(criteria.as_ref().as_ref()).await }.boxed()
            })
            .await;
        Ok(result)
    }

    /// Bounded batch receive. The default policy loops on `receive` for at
    /// most `2 * max_items` attempts collecting up to `max_items` messages;
    /// a failure aborts only while nothing has been collected yet,
    /// otherwise the partial batch is returned as success.
    pub async fn receive_batch(&self, max_items: usize) -> Result<OperationResult> {
        self.core.validate_ready()?;

        if self.connector.supports_batch() {
            let connector = Arc::clone(&self.connector);
            let result = self
                .core
                .pipeline()
                .execute(self.core.identity(), "receive_batch", move || {
                    let connector = Arc::clone(&connector);
                    async move {
                        connector
                            .receive_all(max_items)
                            .await
                            .map(|items| Some(Value::Array(items)))
                    }
                    .boxed()
                })
                .await;
            let count = result
                .data
                .as_ref()
                .and_then(Value::as_array)
                .map(|items| items.len())
                .unwrap_or(0);
            let failed = result.is_failure();
            return Ok(result
                .with_metadata("success_count", count)
                .with_metadata("failure_count", if failed { 1usize } else { 0 })
                .with_metadata("total_count", count)
                .with_metadata("requested", max_items));
        }

        let start = Instant::now();
        let mut collected: Vec<Value> = Vec::new();
        let mut failure: Option<OperationResult> = None;
        let max_attempts = max_items.saturating_mul(2);
        for _ in 0..max_attempts {
            if collected.len() >= max_items {
                break;
            }
            let result = self.receive(None).await?;
            if result.is_failure() {
                if collected.is_empty() {
                    failure = Some(result);
                }
                break;
            }
            if let Some(data) = result.data {
                collected.push(data);
            }
        }

        if let Some(result) = failure {
            return Ok(result
                .with_metadata("operation", "receive_batch")
                .with_metadata("success_count", 0usize)
                .with_metadata("failure_count", 1usize)
                .with_metadata("total_count", 0usize)
                .with_metadata("requested", max_items));
        }

        let count = collected.len();
        Ok(OperationResult::success_with_data(
            format!("received {} of up to {} messages", count, max_items),
            Some(Value::Array(collected)),
        )
        .with_metadata("operation", "receive_batch")
        .with_metadata("success_count", count)
        .with_metadata("failure_count", 0usize)
        .with_metadata("total_count", count)
        .with_metadata("requested", max_items)
        .with_duration(start.elapsed()))
    }

    /// Acknowledge one message through the resilience pipeline
    pub async fn acknowledge(&self, message_id: &str) -> Result<OperationResult> {
        self.core.validate_ready()?;
        let connector = Arc::clone(&self.connector);
        let message_id_owned = message_id.to_string();
        let result = self
            .core
            .pipeline()
            .execute(self.core.identity(), "acknowledge", move || {
                let connector = Arc::clone(&connector);
                let message_id = message_id_owned.clone();
                async move { connector.acknowledge(&message_id).await.map(|()| None) }.boxed()
            })
            .await;
        Ok(result.with_metadata("message_id", message_id))
    }

    /// Start continuous polling on a dedicated task: first tick immediate,
    /// then one tick per interval with no overlap. Fails when polling is
    /// already active or the configured interval is zero.
    pub fn start_polling(&self, callback: Arc<dyn AdapterCallback>) -> Result<()> {
        self.core.validate_ready()?;
        let mut slot = self.polling.lock();
        if slot.is_some() {
            return Err(Error::PollingAlreadyActive(self.core.identity().key()));
        }
        let interval_ms = self.connector.polling_interval_ms();
        if interval_ms == 0 {
            return Err(Error::InvalidPollingInterval { millis: interval_ms });
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let core = Arc::clone(&self.core);
        let connector = Arc::clone(&self.connector);
        self.core.spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Polling task for {} exiting", core.identity());
                        break;
                    }
                    _ = ticker.tick() => {
                        Self::poll_tick(&core, &connector, &callback).await;
                    }
                }
            }
        });
        info!(
            "Polling started for {} every {}ms",
            self.core.identity(),
            interval_ms
        );
        Ok(())
    }

    /// One polling tick: raw receive with success/failure delivery.
    /// A fault becomes a failure callback; the scheduler keeps running.
    async fn poll_tick(
        core: &Arc<AdapterCore>,
        connector: &Arc<dyn OutboundConnector>,
        callback: &Arc<dyn AdapterCallback>,
    ) {
        let start = Instant::now();
        match connector.receive(None).await {
            Ok(Some(data)) => {
                let duration = start.elapsed();
                core.record_success(duration);
                callback.on_success(
                    OperationResult::success_with_data("message received", Some(data))
                        .with_metadata("operation", "poll")
                        .with_duration(duration),
                );
            }
            Ok(None) => {
                // No data and no failure: continue silently
            }
            Err(e) => {
                let duration = start.elapsed();
                let mut context = HashMap::new();
                context.insert("operation".to_string(), "poll".to_string());
                core.pipeline().errors().handle(core.identity(), &e, context);
                core.record_failure(duration, &e.to_string());
                callback.on_failure(
                    OperationResult::from_error(&e)
                        .with_metadata("operation", "poll")
                        .with_duration(duration),
                );
            }
        }
    }

    /// Cancel the polling task. Does not interrupt a tick already
    /// executing; idempotent when not polling.
    pub fn stop_polling(&self) {
        let taken = self.polling.lock().take();
        match taken {
            Some(token) => {
                token.cancel();
                info!("Polling stopped for {}", self.core.identity());
            }
            None => debug!("Polling not active for {}", self.core.identity()),
        }
    }

    /// Whether a polling task is currently scheduled
    pub fn is_polling(&self) -> bool {
        self.polling.lock().is_some()
    }
}
