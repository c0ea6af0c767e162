//! In-memory stock store.
//!
//! Intended for tests/dev. Carries the same semantics as the Postgres
//! store: the per-item `tokio::sync::Mutex` plays the role of the row
//! lock, and the ledger index is re-checked under it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use mensa_core::{ItemId, OrderId, TransactionId};

use super::{StockStore, StockStoreError};
use crate::domain::{DeductOutcome, InventoryRecord, StockItem, StockTransaction};

struct ItemSlot {
    #[allow(dead_code)]
    item: StockItem,
    inventory: tokio::sync::Mutex<InventoryRecord>,
}

#[derive(Default)]
pub struct InMemoryStockStore {
    items: RwLock<HashMap<ItemId, Arc<ItemSlot>>>,
    /// Append-only; insertion order doubles as `created_at` order.
    ledger: RwLock<Vec<StockTransaction>>,
    index: RwLock<HashMap<(OrderId, ItemId), TransactionId>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an item with an initial stock level (test/dev helper; catalog
    /// management is a separate service in production).
    pub fn seed_item(&self, item: StockItem, quantity: u32) {
        let slot = Arc::new(ItemSlot {
            inventory: tokio::sync::Mutex::new(InventoryRecord {
                item_id: item.id,
                quantity,
                version: 1,
                updated_at: Utc::now(),
            }),
            item,
        });
        let item_id = slot.item.id;
        self.items
            .write()
            .expect("items lock poisoned")
            .insert(item_id, slot);
    }

    /// Current stock level, bypassing the deduct path (test helper).
    pub async fn quantity(&self, item_id: ItemId) -> Option<u32> {
        let slot = self.slot(item_id)?;
        Some(slot.inventory.lock().await.quantity)
    }

    /// Current inventory version (test helper).
    pub async fn version(&self, item_id: ItemId) -> Option<u64> {
        let slot = self.slot(item_id)?;
        Some(slot.inventory.lock().await.version)
    }

    fn slot(&self, item_id: ItemId) -> Option<Arc<ItemSlot>> {
        self.items
            .read()
            .expect("items lock poisoned")
            .get(&item_id)
            .cloned()
    }

    fn existing(&self, order_id: OrderId, item_id: ItemId) -> Option<TransactionId> {
        self.index
            .read()
            .expect("index lock poisoned")
            .get(&(order_id, item_id))
            .copied()
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductOutcome, StockStoreError> {
        // Idempotent fast path before taking the item lock.
        if let Some(transaction_id) = self.existing(order_id, item_id) {
            let slot = self.slot(item_id).ok_or(StockStoreError::ItemNotFound)?;
            let remaining = slot.inventory.lock().await.quantity;
            replay_quantity_check(self, order_id, item_id, quantity);
            return Ok(DeductOutcome {
                transaction_id,
                remaining_stock: remaining,
                replayed: true,
            });
        }

        let slot = self.slot(item_id).ok_or(StockStoreError::ItemNotFound)?;
        let mut inventory = slot.inventory.lock().await;

        // Re-check under the lock: a concurrent first-time request may
        // have won while we waited.
        if let Some(transaction_id) = self.existing(order_id, item_id) {
            return Ok(DeductOutcome {
                transaction_id,
                remaining_stock: inventory.quantity,
                replayed: true,
            });
        }

        if inventory.quantity < quantity {
            return Err(StockStoreError::InsufficientStock {
                requested: quantity,
                available: inventory.quantity,
            });
        }

        inventory.quantity -= quantity;
        inventory.version += 1;
        inventory.updated_at = Utc::now();

        let transaction = StockTransaction {
            id: TransactionId::new(),
            order_id,
            item_id,
            quantity_deducted: quantity,
            created_at: Utc::now(),
        };
        let transaction_id = transaction.id;

        // Still holding the item lock: the index insert and the ledger
        // append are atomic with the decrement from any observer's view.
        self.index
            .write()
            .expect("index lock poisoned")
            .insert((order_id, item_id), transaction_id);
        self.ledger
            .write()
            .expect("ledger lock poisoned")
            .push(transaction);

        Ok(DeductOutcome {
            transaction_id,
            remaining_stock: inventory.quantity,
            replayed: false,
        })
    }

    async fn transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StockTransaction>, StockStoreError> {
        Ok(self
            .ledger
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_transactions(
        &self,
        item_id: Option<ItemId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StockTransaction>, StockStoreError> {
        Ok(self
            .ledger
            .read()
            .expect("ledger lock poisoned")
            .iter()
            .rev()
            .filter(|t| item_id.is_none_or(|id| t.item_id == id))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> bool {
        true
    }
}

fn replay_quantity_check(
    store: &InMemoryStockStore,
    order_id: OrderId,
    item_id: ItemId,
    quantity: u32,
) {
    let ledger = store.ledger.read().expect("ledger lock poisoned");
    if let Some(original) = ledger
        .iter()
        .find(|t| t.order_id == order_id && t.item_id == item_id)
    {
        if original.quantity_deducted != quantity {
            warn!(
                original = original.quantity_deducted,
                requested = quantity,
                "replayed deduction with a different quantity; returning original outcome"
            );
        }
    }
}
