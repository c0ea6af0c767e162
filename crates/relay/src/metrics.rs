//! Relay request counters.
//!
//! Lock-free atomics incremented through this API only; readers take a
//! snapshot. Latency is kept as a running sum + count in microseconds so
//! the snapshot can report an average without a histogram dependency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct RelayMetrics {
    total_attempts: AtomicU64,
    successful: AtomicU64,
    rejected: AtomicU64,
    auth_failures: AtomicU64,
    cache_short_circuits: AtomicU64,
    downstream_failures: AtomicU64,
    latency_micros_sum: AtomicU64,
    latency_count: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelayMetricsSnapshot {
    pub total_attempts: u64,
    pub successful: u64,
    pub rejected: u64,
    pub auth_failures: u64,
    pub cache_short_circuits: u64,
    pub downstream_failures: u64,
    pub average_latency_ms: f64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_short_circuit(&self) {
        self.cache_short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downstream_failure(&self) {
        self.downstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_micros_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayMetricsSnapshot {
        let sum = self.latency_micros_sum.load(Ordering::Relaxed);
        let count = self.latency_count.load(Ordering::Relaxed);
        let average_latency_ms = if count == 0 {
            0.0
        } else {
            (sum as f64 / count as f64) / 1000.0
        };

        RelayMetricsSnapshot {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            cache_short_circuits: self.cache_short_circuits.load(Ordering::Relaxed),
            downstream_failures: self.downstream_failures.load(Ordering::Relaxed),
            average_latency_ms,
        }
    }
}
