//! `mensa-ledger` — the Stock Ledger service.
//!
//! Owns inventory quantities and the append-only deduction ledger. The
//! one concurrency-critical operation is [`service::LedgerService::deduct`]:
//! an atomic, idempotent verify-and-decrement keyed on `(order_id,
//! item_id)`, serialized per inventory row.

pub mod app;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod service;
pub mod store;

pub use config::LedgerConfig;
pub use domain::{DeductOutcome, InventoryRecord, StockItem, StockTransaction};
pub use metrics::LedgerMetrics;
pub use service::LedgerService;
pub use store::{InMemoryStockStore, StockStore, StockStoreError};
