//! `mensa-kitchen` — the kitchen order processor.
//!
//! Consumes order events from the durable queue and drives each order
//! through `RECEIVED → IN_PROGRESS → READY`, emitting a status
//! notification per transition. Delivery is at-least-once; the recorded
//! order status makes processing effectively once. A small HTTP surface
//! exposes health, metrics, and read-only order lookups.

pub mod app;
pub mod config;
pub mod consumer;
pub mod domain;
pub mod metrics;
pub mod notifier;
pub mod processor;
pub mod store;

pub use app::{KitchenState, build_app};
pub use config::KitchenConfig;
pub use consumer::QueueConsumer;
pub use metrics::KitchenMetrics;
pub use notifier::{RedisStreamsNotifier, StatusNotifier};
pub use processor::{Handled, OrderProcessor, PrepPlan};
pub use store::{InMemoryKitchenStore, KitchenStore, PostgresKitchenStore};
