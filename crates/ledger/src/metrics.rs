//! Process-wide ledger counters.
//!
//! Lock-free atomics; business logic only ever increments through this
//! API and readers take a point-in-time snapshot.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct LedgerMetrics {
    attempts: AtomicU64,
    deductions: AtomicU64,
    replays: AtomicU64,
    conflicts: AtomicU64,
    not_found: AtomicU64,
    validation_failures: AtomicU64,
    storage_errors: AtomicU64,
    /// Deductions currently between lock acquisition and commit. A value
    /// that stays near zero is the lock-contention-free signal the health
    /// surface exposes.
    in_flight: AtomicI64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LedgerMetricsSnapshot {
    pub attempts: u64,
    pub deductions: u64,
    pub replays: u64,
    pub conflicts: u64,
    pub not_found: u64,
    pub validation_failures: u64,
    pub storage_errors: u64,
    pub in_flight: i64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduction(&self) {
        self.deductions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replay(&self) {
        self.replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn enter_deduct(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exit_deduct(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            deductions: self.deductions.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
