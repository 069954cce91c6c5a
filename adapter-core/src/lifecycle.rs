//! Adapter lifecycle: init/active/destroy state machine
//!
//! Every adapter shares one lifecycle: `uninitialized -> initializing ->
//! active -> destroyed`. Concrete adapters compose an [`AdapterCore`] with
//! a [`Connector`] implementation instead of inheriting from a base class;
//! the core wraps their operations with the resilience pipeline and the
//! monitoring bookkeeping.

use crate::monitoring::MonitoringService;
use crate::pipeline::ResiliencePipeline;
use crate::result::OperationResult;
use crate::types::AdapterIdentity;
use crate::{Error, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Hook contract implemented by concrete protocol connectors
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish the connection/resources. Called once from `initialize`.
    async fn connect(&self) -> Result<()>;

    /// Tear down the connection/resources. Called once from `destroy`;
    /// faults are reported but do not abort the shutdown sequence.
    async fn disconnect(&self) -> Result<()>;

    /// Connectivity probe used by `test_connection`
    async fn check_connection(&self) -> Result<()>;
}

/// Shared lifecycle and resilience component embedded by every adapter
pub struct AdapterCore {
    identity: AdapterIdentity,
    initialized: AtomicBool,
    active: AtomicBool,
    pipeline: Arc<ResiliencePipeline>,
    monitoring: Option<Arc<MonitoringService>>,
    tasks: TaskTracker,
}

impl AdapterCore {
    /// Create an uninitialized core
    pub fn new(
        identity: AdapterIdentity,
        pipeline: Arc<ResiliencePipeline>,
        monitoring: Option<Arc<MonitoringService>>,
    ) -> Self {
        Self {
            identity,
            initialized: AtomicBool::new(false),
            active: AtomicBool::new(false),
            pipeline,
            monitoring,
            tasks: TaskTracker::new(),
        }
    }

    /// Identity of this adapter instance
    pub fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    /// Whether `initialize` has completed
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Whether the adapter accepts operations
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The resilience pipeline wrapping this adapter's operations
    pub fn pipeline(&self) -> &Arc<ResiliencePipeline> {
        &self.pipeline
    }

    /// Run the init hook, then mark the adapter initialized and active and
    /// register it with monitoring. A second call is a warning no-op; a
    /// hook fault leaves the adapter non-active.
    pub async fn initialize<F>(&self, hook: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if self.is_initialized() {
            warn!("Adapter {} is already initialized", self.identity);
            return Ok(());
        }
        info!("Initializing adapter {}", self.identity);

        if let Err(e) = hook.await {
            error!("Initialization of adapter {} failed: {}", self.identity, e);
            return Err(Error::InitializationFailed {
                adapter: self.identity.key(),
                reason: e.to_string(),
            });
        }

        self.tasks.reopen();
        self.initialized.store(true, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        if let Some(monitoring) = &self.monitoring {
            monitoring.register_adapter(&self.identity);
        }
        info!("Adapter {} initialized", self.identity);
        Ok(())
    }

    /// Deactivate, run the teardown hook, wait for in-flight work (bounded)
    /// and unregister from monitoring. A teardown fault is reported, never
    /// rethrown into the caller's shutdown sequence. No-op when never
    /// initialized.
    pub async fn destroy<F>(&self, hook: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if !self.is_initialized() {
            debug!("Adapter {} was never initialized, nothing to destroy", self.identity);
            return Ok(());
        }
        info!("Destroying adapter {}", self.identity);
        self.active.store(false, Ordering::SeqCst);

        if let Err(e) = hook.await {
            warn!("Teardown hook of adapter {} failed: {}", self.identity, e);
        }

        self.tasks.close();
        let wait = Duration::from_secs(crate::DESTROY_WAIT_SECS);
        if tokio::time::timeout(wait, self.tasks.wait()).await.is_err() {
            warn!(
                "Adapter {} still has in-flight work after {:?}, abandoning it",
                self.identity, wait
            );
        }

        if let Some(monitoring) = &self.monitoring {
            monitoring.unregister_adapter(&self.identity);
        }
        self.pipeline.forget(&self.identity);
        self.initialized.store(false, Ordering::SeqCst);
        info!("Adapter {} destroyed", self.identity);
        Ok(())
    }

    /// Run the connectivity probe with the same timing/metrics bookkeeping
    /// as a normal operation, bypassing the resilience pipeline. Requires
    /// the adapter to be initialized.
    pub async fn test_connection<F>(&self, probe: F) -> Result<OperationResult>
    where
        F: Future<Output = Result<()>> + Send,
    {
        if !self.is_initialized() {
            return Err(Error::NotInitialized(self.identity.key()));
        }
        let start = Instant::now();
        match probe.await {
            Ok(()) => {
                let duration = start.elapsed();
                self.record_success(duration);
                Ok(OperationResult::success("connection test passed")
                    .with_metadata("operation", "test_connection")
                    .with_duration(duration))
            }
            Err(e) => {
                let duration = start.elapsed();
                self.record_failure(duration, &e.to_string());
                Ok(OperationResult::from_error(&e)
                    .with_metadata("operation", "test_connection")
                    .with_duration(duration))
            }
        }
    }

    /// Precondition check run before every mutating operation
    pub fn validate_ready(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized(self.identity.key()));
        }
        if !self.is_active() {
            return Err(Error::NotActive(self.identity.key()));
        }
        Ok(())
    }

    /// Spawn adapter-owned background work tracked until destroy
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(future);
    }

    pub(crate) fn record_success(&self, duration: Duration) {
        if let Some(monitoring) = &self.monitoring {
            monitoring.record_success(&self.identity, duration);
        }
    }

    pub(crate) fn record_failure(&self, duration: Duration, error: &str) {
        if let Some(monitoring) = &self.monitoring {
            monitoring.record_failure(&self.identity, duration, error);
        }
    }
}
