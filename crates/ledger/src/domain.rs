//! Stock ledger domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mensa_core::{ItemId, OrderId, TransactionId};

/// A catalog item the ledger tracks stock for.
///
/// Immutable here; catalog management lives in a separate service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: ItemId,
    pub name: String,
    /// Unit price in cents.
    pub price_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Current stock level for one item. One-to-one with [`StockItem`].
///
/// # Invariants
/// - `quantity` never goes negative.
/// - `version` increases by exactly 1 on every mutation.
/// - Mutated only under the per-row exclusive lock held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub item_id: ItemId,
    pub quantity: u32,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Immutable ledger entry for one completed deduction.
///
/// `(order_id, item_id)` is the idempotency key: at most one transaction
/// may ever exist per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity_deducted: u32,
    pub created_at: DateTime<Utc>,
}

/// Result of a deduction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductOutcome {
    pub transaction_id: TransactionId,
    pub remaining_stock: u32,
    /// True when the call hit the idempotent fast path and no inventory
    /// was touched.
    pub replayed: bool,
}
