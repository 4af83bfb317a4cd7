//! Circuit breaker guarding the synchronous push.
//!
//! When the replica is down every create at the source would otherwise
//! wait out a full push timeout. The breaker trips after a run of failures
//! and rejects pushes immediately until the open window elapses; the event
//! channel still carries the update in the meantime.
//!
//! # States
//!
//! - **Closed**: pushes pass through
//! - **Open**: replica considered unhealthy, pushes rejected without a call
//! - **HalfOpen**: probing whether the replica recovered
//!
//! # Usage
//!
//! ```rust,no_run
//! # use platform_replication::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
//! # async fn example() -> Result<(), CircuitError<String>> {
//! let circuit = CircuitBreaker::new("sync_push", CircuitConfig::default());
//!
//! match circuit.call(|| async { Ok::<(), String>(()) }).await {
//!     Ok(()) => { /* delivered */ }
//!     Err(CircuitError::Rejected) => { /* circuit open, skip */ }
//!     Err(CircuitError::Inner(e)) => { /* push error */ }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::PushConfig;
use crate::metrics;
use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open).
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    /// Check if this is a rejection (circuit open).
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected)
    }

    /// Get the inner error if present.
    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            CircuitError::Rejected => None,
        }
    }
}

/// Failure rate a full closed window must exceed to open the circuit.
const TRIP_RATE: f32 = 0.99;

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Number of failures in the closed window that trips the circuit.
    pub failure_threshold: u32,
    /// Number of trial calls allowed while half-open.
    pub success_threshold: u32,
    /// How long to stay open before probing (half-open).
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    /// Build the push circuit config from [`PushConfig`].
    pub fn from_push(config: &PushConfig) -> Self {
        Self {
            failure_threshold: config.circuit_failure_threshold.max(1),
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(config.circuit_reset_timeout_sec),
        }
    }

    /// Fast recovery for testing.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// A named circuit breaker with call accounting.
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config.
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        // The breaker trips when the failure rate of a full closed window
        // exceeds error_rate. Just under 1.0 means a window made entirely of
        // failures, i.e. roughly "N consecutive failures".
        let recloser = Recloser::custom()
            .error_rate(TRIP_RATE)
            .closed_len(config.failure_threshold as usize)
            .half_open_len(config.success_threshold as usize)
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Get the circuit breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an async operation through the circuit breaker.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        match self.inner.call(f()).await {
            Ok(result) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "success");
                debug!(circuit = %self.name, "Circuit call succeeded");
                Ok(result)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "rejected");
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "failure");
                debug!(circuit = %self.name, "Circuit call failed");
                Err(CircuitError::Inner(e))
            }
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            calls_total: self.calls_total(),
            successes: self.successes(),
            failures: self.failures(),
            rejections: self.rejections(),
        }
    }
}

/// Call counters of one circuit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitStats {
    pub calls_total: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}
