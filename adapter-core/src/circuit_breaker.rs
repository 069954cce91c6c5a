//! Circuit breaker pattern per adapter instance

use crate::metrics::CIRCUIT_BREAKER_STATE;
use crate::types::AdapterIdentity;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Closed (normal operation)
    Closed,
    /// Open (rejecting requests)
    Open,
    /// Half-open (next call is a trial)
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure threshold (open after N consecutive qualifying failures)
    pub failure_threshold: u32,
    /// Milliseconds since the last failure before a half-open trial
    pub open_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::DEFAULT_CB_FAILURE_THRESHOLD,
            open_timeout_ms: crate::DEFAULT_CB_TIMEOUT_MS,
        }
    }
}

/// Circuit breaker for one adapter instance
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Consecutive qualifying failures
    consecutive_failures: u32,
    /// Last failure time
    last_failure_at: Option<DateTime<Utc>>,
    /// Open flag; only set once the threshold is reached
    open: bool,
    /// Config
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            open: false,
            config,
        }
    }

    fn timeout_elapsed(&self) -> bool {
        match self.last_failure_at {
            Some(at) => {
                let elapsed = Utc::now().signed_duration_since(at).num_milliseconds();
                elapsed >= self.config.open_timeout_ms as i64
            }
            None => true,
        }
    }

    /// Check whether a call may proceed. An open breaker lets the next call
    /// through as a trial once the open timeout has elapsed.
    pub fn is_call_allowed(&self) -> bool {
        !self.open || self.timeout_elapsed()
    }

    /// Current state, derived from the open flag and the timeout
    pub fn state(&self) -> CircuitState {
        if !self.open {
            CircuitState::Closed
        } else if self.timeout_elapsed() {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Record a success (or a non-qualifying fault). Resets the consecutive
    /// counter; closes an open breaker only when the open timeout has
    /// elapsed, i.e. when this was the half-open trial.
    pub fn record_success(&mut self, key: &str) {
        self.consecutive_failures = 0;
        if self.open && self.timeout_elapsed() {
            info!("Circuit breaker closing for adapter {}", key);
            self.open = false;
            self.last_failure_at = None;
        }
    }

    /// Record a qualifying failure
    pub fn record_failure(&mut self, key: &str) {
        self.consecutive_failures += 1;
        self.last_failure_at = Some(Utc::now());

        if !self.open && self.consecutive_failures >= self.config.failure_threshold {
            warn!(
                "Circuit breaker opening for adapter {} after {} consecutive failures",
                key, self.consecutive_failures
            );
            self.open = true;
        } else if self.open {
            // Trial failure; the open timeout restarts from this failure
            warn!("Circuit breaker staying open for adapter {}", key);
        }
    }

    /// Force closed state and zero counters (manual intervention)
    pub fn reset(&mut self, key: &str) {
        info!("Manually resetting circuit breaker for adapter {}", key);
        self.open = false;
        self.consecutive_failures = 0;
        self.last_failure_at = None;
    }

    /// Consecutive qualifying failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Circuit breaker registry keyed by adapter identity.
///
/// Breakers are created lazily on first use and removed when the adapter is
/// destroyed; each entry is mutated under its own shard lock, no global
/// lock is held during an operation.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Create a registry with the given default config
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    fn gauge_value(state: CircuitState) -> i64 {
        match state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }

    fn update_gauge(key: &str, state: CircuitState) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[key])
            .set(Self::gauge_value(state));
    }

    /// Check whether a call for this adapter may proceed
    pub fn is_call_allowed(&self, identity: &AdapterIdentity) -> bool {
        let key = identity.key();
        self.breakers
            .entry(key)
            .or_insert_with(|| CircuitBreaker::new(self.default_config.clone()))
            .is_call_allowed()
    }

    /// Record a success for this adapter
    pub fn record_success(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        let mut breaker = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| CircuitBreaker::new(self.default_config.clone()));
        breaker.record_success(&key);
        Self::update_gauge(&key, breaker.state());
    }

    /// Record a qualifying failure for this adapter
    pub fn record_failure(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        let mut breaker = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| CircuitBreaker::new(self.default_config.clone()));
        breaker.record_failure(&key);
        Self::update_gauge(&key, breaker.state());
    }

    /// Current state for this adapter (`Closed` when no breaker exists yet)
    pub fn state(&self, identity: &AdapterIdentity) -> CircuitState {
        self.breakers
            .get(&identity.key())
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed)
    }

    /// Consecutive failure count for this adapter
    pub fn consecutive_failures(&self, identity: &AdapterIdentity) -> u32 {
        self.breakers
            .get(&identity.key())
            .map(|b| b.consecutive_failures())
            .unwrap_or(0)
    }

    /// Manually reset the breaker for this adapter
    pub fn reset(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        if let Some(mut breaker) = self.breakers.get_mut(&key) {
            breaker.reset(&key);
            Self::update_gauge(&key, breaker.state());
        }
    }

    /// Drop the breaker for this adapter (called on destroy/unregister)
    pub fn remove(&self, identity: &AdapterIdentity) {
        let key = identity.key();
        self.breakers.remove(&key);
        let _ = CIRCUIT_BREAKER_STATE.remove_label_values(&[&key]);
    }
}
