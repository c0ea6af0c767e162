//! `mensa-relay` — the order relay gateway.
//!
//! One pass per HTTP request: authenticate, consult the stock cache for a
//! known-zero short-circuit, call the stock ledger, then hand the order to
//! the kitchen without waiting for delivery. Terminal outcomes are counted
//! exactly once and latency is recorded end to end.

pub mod app;
pub mod cache;
pub mod config;
pub mod ledger_client;
pub mod metrics;
pub mod middleware;
pub mod order;
pub mod publisher;

pub use app::{RelayState, build_app};
pub use cache::{InMemoryStockCache, RedisStockCache, StockCache};
pub use config::RelayConfig;
pub use ledger_client::{DeductClient, DeductError, DeductSuccess, HttpDeductClient};
pub use metrics::RelayMetrics;
pub use publisher::{OrderEventPublisher, PublishError, RedisStreamsPublisher};
