//! Deduction service: validation, metrics, and error translation on top
//! of the store.

use std::sync::Arc;

use tracing::instrument;

use mensa_core::{CoreError, ItemId, OrderId};

use crate::domain::{DeductOutcome, StockTransaction};
use crate::metrics::LedgerMetrics;
use crate::store::{StockStore, StockStoreError};

/// Hard cap on audit page size.
const MAX_PAGE_SIZE: u32 = 100;

pub struct LedgerService {
    store: Arc<dyn StockStore>,
    metrics: Arc<LedgerMetrics>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn StockStore>, metrics: Arc<LedgerMetrics>) -> Self {
        Self { store, metrics }
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn StockStore> {
        &self.store
    }

    /// The public deduction contract.
    ///
    /// Never retries internally: retries are the caller's responsibility,
    /// made safe by the `(order_id, item_id)` idempotency key.
    #[instrument(skip(self), fields(order_id = %order_id, item_id = %item_id, quantity))]
    pub async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductOutcome, CoreError> {
        self.metrics.record_attempt();

        if quantity == 0 {
            self.metrics.record_validation_failure();
            return Err(CoreError::validation("quantity must be greater than 0"));
        }

        self.metrics.enter_deduct();
        let result = self.store.deduct(order_id, item_id, quantity).await;
        self.metrics.exit_deduct();

        match result {
            Ok(outcome) => {
                if outcome.replayed {
                    self.metrics.record_replay();
                } else {
                    self.metrics.record_deduction();
                }
                Ok(outcome)
            }
            Err(e) => {
                let mapped = self.map_store_error(e);
                Err(mapped)
            }
        }
    }

    pub async fn transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StockTransaction>, CoreError> {
        let transactions = self
            .store
            .transactions_by_order(order_id)
            .await
            .map_err(|e| self.map_store_error(e))?;

        if transactions.is_empty() {
            return Err(CoreError::not_found("no transactions for this order"));
        }
        Ok(transactions)
    }

    pub async fn list_transactions(
        &self,
        item_id: Option<ItemId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StockTransaction>, CoreError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.store
            .list_transactions(item_id, limit, offset)
            .await
            .map_err(|e| self.map_store_error(e))
    }

    fn map_store_error(&self, e: StockStoreError) -> CoreError {
        match e {
            StockStoreError::ItemNotFound => {
                self.metrics.record_not_found();
                CoreError::not_found("item or inventory record not found")
            }
            StockStoreError::InsufficientStock { .. } => {
                self.metrics.record_conflict();
                CoreError::conflict("insufficient stock")
            }
            StockStoreError::Storage(msg) => {
                self.metrics.record_storage_error();
                CoreError::transient(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StockItem;
    use crate::store::InMemoryStockStore;
    use chrono::Utc;

    fn service_with_stock(quantity: u32) -> (LedgerService, ItemId) {
        let store = InMemoryStockStore::new();
        let item_id = ItemId::new();
        store.seed_item(
            StockItem {
                id: item_id,
                name: "curry".to_string(),
                price_cents: 520,
                created_at: Utc::now(),
            },
            quantity,
        );
        (
            LedgerService::new(Arc::new(store), Arc::new(LedgerMetrics::new())),
            item_id,
        )
    }

    #[tokio::test]
    async fn zero_quantity_is_a_validation_error() {
        let (service, item_id) = service_with_stock(5);
        let err = service
            .deduct(OrderId::new(), item_id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(service.metrics().snapshot().validation_failures, 1);
    }

    #[tokio::test]
    async fn scenario_deduct_replay_conflict_drain() {
        // Walkthrough: 10 on hand, deduct 3, replay, fail 8, drain 7.
        let (service, item_id) = service_with_stock(10);

        let a = OrderId::new();
        let first = service.deduct(a, item_id, 3).await.unwrap();
        assert_eq!(first.remaining_stock, 7);

        let replay = service.deduct(a, item_id, 3).await.unwrap();
        assert_eq!(replay.transaction_id, first.transaction_id);
        assert_eq!(replay.remaining_stock, 7);

        let err = service
            .deduct(OrderId::new(), item_id, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let drained = service
            .deduct(OrderId::new(), item_id, 7)
            .await
            .unwrap();
        assert_eq!(drained.remaining_stock, 0);

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot.deductions, 2);
        assert_eq!(snapshot.replays, 1);
        assert_eq!(snapshot.conflicts, 1);
    }

    #[tokio::test]
    async fn transactions_by_order_404s_when_empty() {
        let (service, _item_id) = service_with_stock(5);
        let err = service
            .transactions_by_order(OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let (service, item_id) = service_with_stock(500);
        for _ in 0..150 {
            service
                .deduct(OrderId::new(), item_id, 1)
                .await
                .unwrap();
        }
        let page = service
            .list_transactions(None, 10_000, 0)
            .await
            .unwrap();
        assert_eq!(page.len(), 100);
    }
}
