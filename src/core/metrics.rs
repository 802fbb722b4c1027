//! Runtime metrics for observability
//!
//! Counters for dispatch health (delivered events, destination failures,
//! reloads) and for batching destinations (accepted events, flushed batches).

use std::sync::atomic::{AtomicU64, Ordering};

/// Dispatch and configuration counters of a logger hierarchy
///
/// # Example
///
/// ```
/// use rust_logevents::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_dispatched();
/// metrics.record_failure();
///
/// assert_eq!(metrics.events_dispatched(), 1);
/// assert_eq!(metrics.failures(), 1);
/// ```
#[derive(Debug)]
pub struct LoggerMetrics {
    /// Events handed to an observer chain
    events_dispatched: AtomicU64,

    /// Events whose observer chain reported an error or panicked
    failures: AtomicU64,

    /// Configuration changes applied
    reconfigurations: AtomicU64,

    /// Configuration reloads rejected as invalid
    rejected_reconfigurations: AtomicU64,
}

impl LoggerMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            reconfigurations: AtomicU64::new(0),
            rejected_reconfigurations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reconfigurations(&self) -> u64 {
        self.reconfigurations.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_reconfigurations(&self) -> u64 {
        self.rejected_reconfigurations.load(Ordering::Relaxed)
    }

    /// Record a dispatched event, returning the previous count
    #[inline]
    pub fn record_dispatched(&self) -> u64 {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_reconfiguration(&self) -> u64 {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_rejected_reconfiguration(&self) -> u64 {
        self.rejected_reconfigurations.fetch_add(1, Ordering::Relaxed)
    }

    /// Failure rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been dispatched.
    pub fn failure_rate(&self) -> f64 {
        let dispatched = self.events_dispatched() as f64;
        if dispatched == 0.0 {
            0.0
        } else {
            (self.failures() as f64 / dispatched) * 100.0
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        self.events_dispatched.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.reconfigurations.store(0, Ordering::Relaxed);
        self.rejected_reconfigurations.store(0, Ordering::Relaxed);
    }
}

impl Default for LoggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoggerMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            events_dispatched: AtomicU64::new(self.events_dispatched()),
            failures: AtomicU64::new(self.failures()),
            reconfigurations: AtomicU64::new(self.reconfigurations()),
            rejected_reconfigurations: AtomicU64::new(self.rejected_reconfigurations()),
        }
    }
}

/// Counters of one batching destination
#[derive(Debug, Default)]
pub struct BatchMetrics {
    events_accepted: AtomicU64,
    batches_flushed: AtomicU64,
    processor_failures: AtomicU64,
}

impl BatchMetrics {
    pub const fn new() -> Self {
        Self {
            events_accepted: AtomicU64::new(0),
            batches_flushed: AtomicU64::new(0),
            processor_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn events_accepted(&self) -> u64 {
        self.events_accepted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn processor_failures(&self) -> u64 {
        self.processor_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_accepted(&self) -> u64 {
        self.events_accepted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flushed(&self) -> u64 {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_processor_failure(&self) -> u64 {
        self.processor_failures.fetch_add(1, Ordering::Relaxed)
    }
}
