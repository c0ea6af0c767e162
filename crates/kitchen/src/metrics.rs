//! Processing counters for the kitchen.
//!
//! Lock-free atomics incremented through this API only; readers take a
//! snapshot. Processing time is kept as a running sum + count in
//! microseconds so the snapshot can report an average.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct KitchenMetrics {
    received: AtomicU64,
    processed: AtomicU64,
    duplicates: AtomicU64,
    failures: AtomicU64,
    notification_failures: AtomicU64,
    dead_lettered: AtomicU64,
    in_progress: AtomicI64,
    processing_micros_sum: AtomicU64,
    processing_count: AtomicU64,
    queue_connected: AtomicBool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KitchenMetricsSnapshot {
    pub total_orders_received: u64,
    pub total_orders_processed: u64,
    pub duplicates: u64,
    pub total_failures: u64,
    pub notification_failures: u64,
    pub dead_lettered: u64,
    pub orders_in_progress: i64,
    pub average_processing_time_ms: f64,
    pub queue_connected: bool,
}

impl KitchenMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.processing_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enter_preparation(&self) {
        self.in_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exit_preparation(&self) {
        self.in_progress.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set_queue_connected(&self, connected: bool) {
        self.queue_connected.store(connected, Ordering::Relaxed);
    }

    pub fn queue_connected(&self) -> bool {
        self.queue_connected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> KitchenMetricsSnapshot {
        let sum = self.processing_micros_sum.load(Ordering::Relaxed);
        let count = self.processing_count.load(Ordering::Relaxed);
        let average_processing_time_ms = if count == 0 {
            0.0
        } else {
            (sum as f64 / count as f64) / 1000.0
        };

        KitchenMetricsSnapshot {
            total_orders_received: self.received.load(Ordering::Relaxed),
            total_orders_processed: self.processed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            orders_in_progress: self.in_progress.load(Ordering::Relaxed),
            average_processing_time_ms,
            queue_connected: self.queue_connected(),
        }
    }
}
