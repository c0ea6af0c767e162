//! Stock storage seam.
//!
//! Both implementations carry the *full* deduct semantics (pre-lock
//! idempotent fast path, exclusive per-row lock, under-lock re-check,
//! atomic decrement + ledger insert) so the consistency properties hold
//! no matter which backend is wired in.

use async_trait::async_trait;
use thiserror::Error;

use mensa_core::{ItemId, OrderId};

use crate::domain::{DeductOutcome, StockTransaction};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

#[derive(Debug, Error)]
pub enum StockStoreError {
    /// No item / inventory record exists for the requested item.
    #[error("item not found")]
    ItemNotFound,

    /// The requested quantity exceeds the current stock level.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// Backend failure (connection, lock timeout, constraint anomaly).
    /// Retryable: all mutations are idempotent.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait StockStore: Send + Sync {
    /// Atomically verify-and-deduct `quantity` for `(order_id, item_id)`.
    ///
    /// Exactly-once effect per key: a replay returns the original
    /// transaction id and the current stock level without writing
    /// anything. Preconditions (`quantity > 0`) are the caller's job.
    async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductOutcome, StockStoreError>;

    /// All ledger entries for one order.
    async fn transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StockTransaction>, StockStoreError>;

    /// Ledger entries, newest first, optionally filtered by item.
    async fn list_transactions(
        &self,
        item_id: Option<ItemId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StockTransaction>, StockStoreError>;

    /// Backend reachability probe for the health endpoint.
    async fn ping(&self) -> bool;
}
