//! Metrics hooks for scalable filter operations
//!
//! Provides instrumentation points for monitoring tier growth, duplicate
//! suppression and lookup latencies.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use scalable_bloom::{Metrics, ScalableConfig, ScalableFilter, ScalableFilterApi};
//!
//! let metrics = Arc::new(Metrics::new());
//! let mut filter = ScalableFilter::new(ScalableConfig::default())
//!     .unwrap()
//!     .with_metrics(metrics.clone());
//!
//! filter.insert(b"key").unwrap();
//! assert_eq!(metrics.snapshot().tiers_added, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for scalable filter operations
///
/// Thread-safe counters for monitoring filter behaviour.
#[derive(Default)]
pub struct Metrics {
    /// Total tiers allocated
    pub tiers_added: AtomicU64,
    /// Total bits allocated across tiers
    pub bits_allocated: AtomicU64,
    /// Inserts that added a new key
    pub inserts_accepted: AtomicU64,
    /// Inserts suppressed because the key already tested present
    pub inserts_rejected: AtomicU64,
    /// Total lookups performed
    pub lookups_performed: AtomicU64,
    /// Total positive lookups (matches)
    pub lookups_positive: AtomicU64,
    /// Cumulative lookup time in nanoseconds
    pub lookup_time_ns: AtomicU64,
    /// Cumulative insert time in nanoseconds
    pub insert_time_ns: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record tier allocation
    pub fn record_tier_added(&self, capacity_bits: u64) {
        self.tiers_added.fetch_add(1, Ordering::Relaxed);
        self.bits_allocated.fetch_add(capacity_bits, Ordering::Relaxed);
    }

    /// Record an insert call
    ///
    /// # Arguments
    /// * `duration` - Time taken, including the membership check
    /// * `accepted` - Whether the key was new
    pub fn record_insert(&self, duration: Duration, accepted: bool) {
        if accepted {
            self.inserts_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inserts_rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.insert_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record lookup operation
    pub fn record_lookup(&self, duration: Duration, found: bool) {
        self.lookups_performed.fetch_add(1, Ordering::Relaxed);
        self.lookup_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        if found {
            self.lookups_positive.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tiers_added: self.tiers_added.load(Ordering::Relaxed),
            bits_allocated: self.bits_allocated.load(Ordering::Relaxed),
            inserts_accepted: self.inserts_accepted.load(Ordering::Relaxed),
            inserts_rejected: self.inserts_rejected.load(Ordering::Relaxed),
            lookups_performed: self.lookups_performed.load(Ordering::Relaxed),
            lookups_positive: self.lookups_positive.load(Ordering::Relaxed),
            avg_lookup_ns: self.avg_lookup_time_ns(),
            avg_insert_ns: self.avg_insert_time_ns(),
        }
    }

    /// Calculate average lookup time in nanoseconds
    pub fn avg_lookup_time_ns(&self) -> u64 {
        let total = self.lookup_time_ns.load(Ordering::Relaxed);
        let count = self.lookups_performed.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Calculate average insert time in nanoseconds
    pub fn avg_insert_time_ns(&self) -> u64 {
        let total = self.insert_time_ns.load(Ordering::Relaxed);
        let count = self.inserts_accepted.load(Ordering::Relaxed)
            + self.inserts_rejected.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Share of insert calls suppressed as duplicates
    ///
    /// Includes genuine duplicates as well as false positives.
    pub fn rejection_rate(&self) -> f64 {
        let accepted = self.inserts_accepted.load(Ordering::Relaxed);
        let rejected = self.inserts_rejected.load(Ordering::Relaxed);
        let total = accepted + rejected;
        if total > 0 {
            rejected as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.tiers_added.store(0, Ordering::Relaxed);
        self.bits_allocated.store(0, Ordering::Relaxed);
        self.inserts_accepted.store(0, Ordering::Relaxed);
        self.inserts_rejected.store(0, Ordering::Relaxed);
        self.lookups_performed.store(0, Ordering::Relaxed);
        self.lookups_positive.store(0, Ordering::Relaxed);
        self.lookup_time_ns.store(0, Ordering::Relaxed);
        self.insert_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub tiers_added: u64,
    pub bits_allocated: u64,
    pub inserts_accepted: u64,
    pub inserts_rejected: u64,
    pub lookups_performed: u64,
    pub lookups_positive: u64,
    pub avg_lookup_ns: u64,
    pub avg_insert_ns: u64,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to integrate with external metrics systems
/// like Prometheus, StatsD, or OpenTelemetry.
pub trait MetricsRecorder: Send + Sync {
    /// Record tier allocation
    fn record_tier_added(&self, capacity_bits: u64);

    /// Record an insert call
    fn record_insert(&self, duration: Duration, accepted: bool);

    /// Record lookup operation
    fn record_lookup(&self, duration: Duration, found: bool);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_tier_added(&self, _: u64) {}
    fn record_insert(&self, _: Duration, _: bool) {}
    fn record_lookup(&self, _: Duration, _: bool) {}
}

impl MetricsRecorder for Metrics {
    fn record_tier_added(&self, capacity_bits: u64) {
        Metrics::record_tier_added(self, capacity_bits);
    }

    fn record_insert(&self, duration: Duration, accepted: bool) {
        Metrics::record_insert(self, duration, accepted);
    }

    fn record_lookup(&self, duration: Duration, found: bool) {
        Metrics::record_lookup(self, duration, found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let snapshot = Metrics::new().snapshot();

        assert_eq!(snapshot.tiers_added, 0);
        assert_eq!(snapshot.inserts_accepted, 0);
        assert_eq!(snapshot.lookups_performed, 0);
    }

    #[test]
    fn test_record_tier_added() {
        let metrics = Metrics::new();

        metrics.record_tier_added(100);
        metrics.record_tier_added(200);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tiers_added, 2);
        assert_eq!(snapshot.bits_allocated, 300);
    }

    #[test]
    fn test_record_lookups() {
        let metrics = Metrics::new();

        metrics.record_lookup(Duration::from_nanos(100), true);
        metrics.record_lookup(Duration::from_nanos(150), false);
        metrics.record_lookup(Duration::from_nanos(120), true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lookups_performed, 3);
        assert_eq!(snapshot.lookups_positive, 2);
        assert_eq!(snapshot.avg_lookup_ns, 123); // (100 + 150 + 120) / 3
    }

    #[test]
    fn test_rejection_rate() {
        let metrics = Metrics::new();

        for _ in 0..90 {
            metrics.record_insert(Duration::from_nanos(100), true);
        }
        for _ in 0..10 {
            metrics.record_insert(Duration::from_nanos(100), false);
        }

        assert!((metrics.rejection_rate() - 0.1).abs() < 1e-9);
        assert_eq!(metrics.avg_insert_time_ns(), 100);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();

        metrics.record_tier_added(1000);
        metrics.record_lookup(Duration::from_nanos(100), true);
        metrics.record_insert(Duration::from_nanos(50), true);

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tiers_added, 0);
        assert_eq!(snapshot.lookups_performed, 0);
        assert_eq!(snapshot.inserts_accepted, 0);
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoOpMetrics;
        metrics.record_tier_added(1000);
        metrics.record_insert(Duration::from_nanos(100), true);
        metrics.record_lookup(Duration::from_nanos(100), true);
    }
}
