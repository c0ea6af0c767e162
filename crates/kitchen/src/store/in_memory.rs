//! In-memory kitchen store.
//!
//! Intended for tests/dev. Carries the same semantics as the Postgres
//! store: a single map lock plays the role of the unique `order_id`
//! constraint plus the per-row lock, so concurrent admits of the same
//! order yield exactly one `Created`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use mensa_core::OrderId;
use mensa_events::KitchenStatus;

use super::{AdmitOutcome, KitchenStore, KitchenStoreError, TransitionOutcome};
use crate::domain::{KitchenOrder, NewKitchenOrder, StatusHistoryEntry};

struct Entry {
    order: KitchenOrder,
    history: Vec<StatusHistoryEntry>,
}

#[derive(Default)]
pub struct InMemoryKitchenStore {
    orders: Mutex<HashMap<OrderId, Entry>>,
}

impl InMemoryKitchenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of order rows (test helper).
    pub fn order_count(&self) -> usize {
        self.orders.lock().expect("orders lock poisoned").len()
    }

    /// History length for one order (test helper).
    pub fn history_len(&self, order_id: OrderId) -> usize {
        self.orders
            .lock()
            .expect("orders lock poisoned")
            .get(&order_id)
            .map(|e| e.history.len())
            .unwrap_or(0)
    }
}

fn history_entry(kitchen_order_id: Uuid, status: KitchenStatus) -> StatusHistoryEntry {
    StatusHistoryEntry {
        id: Uuid::new_v4(),
        kitchen_order_id,
        status,
        changed_at: Utc::now(),
    }
}

#[async_trait]
impl KitchenStore for InMemoryKitchenStore {
    async fn admit(&self, order: NewKitchenOrder) -> Result<AdmitOutcome, KitchenStoreError> {
        let mut orders = self.orders.lock().expect("orders lock poisoned");

        if let Some(existing) = orders.get(&order.order_id) {
            return Ok(AdmitOutcome::Existing(existing.order.status));
        }

        let row = KitchenOrder {
            id: Uuid::new_v4(),
            order_id: order.order_id,
            student_id: order.student_id,
            item_id: order.item_id,
            quantity: order.quantity,
            status: KitchenStatus::Received,
            received_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let entry = Entry {
            history: vec![history_entry(row.id, KitchenStatus::Received)],
            order: row.clone(),
        };
        orders.insert(order.order_id, entry);

        Ok(AdmitOutcome::Created(row))
    }

    async fn transition(
        &self,
        order_id: OrderId,
        to: KitchenStatus,
    ) -> Result<TransitionOutcome, KitchenStoreError> {
        let mut orders = self.orders.lock().expect("orders lock poisoned");
        let entry = orders
            .get_mut(&order_id)
            .ok_or(KitchenStoreError::OrderNotFound)?;

        // Forward-only: an order at or past the target status is a no-op.
        if entry.order.status >= to {
            return Ok(TransitionOutcome::AlreadyAt(entry.order.status));
        }

        let now = Utc::now();
        entry.order.status = to;
        match to {
            KitchenStatus::InProgress => entry.order.started_at = Some(now),
            KitchenStatus::Ready => entry.order.completed_at = Some(now),
            KitchenStatus::Received => {}
        }
        entry.history.push(history_entry(entry.order.id, to));

        Ok(TransitionOutcome::Applied(entry.order.clone()))
    }

    async fn order_with_history(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(KitchenOrder, Vec<StatusHistoryEntry>)>, KitchenStoreError> {
        let orders = self.orders.lock().expect("orders lock poisoned");
        Ok(orders
            .get(&order_id)
            .map(|e| (e.order.clone(), e.history.clone())))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mensa_core::{ItemId, StudentId};

    fn new_order(order_id: OrderId) -> NewKitchenOrder {
        NewKitchenOrder {
            order_id,
            student_id: StudentId::new("s-1"),
            item_id: ItemId::new(),
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn admit_is_idempotent_per_order_id() {
        let store = InMemoryKitchenStore::new();
        let order_id = OrderId::new();

        let first = store.admit(new_order(order_id)).await.unwrap();
        assert!(matches!(first, AdmitOutcome::Created(_)));

        let second = store.admit(new_order(order_id)).await.unwrap();
        assert_eq!(second, AdmitOutcome::Existing(KitchenStatus::Received));
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.history_len(order_id), 1);
    }

    #[tokio::test]
    async fn status_never_regresses() {
        let store = InMemoryKitchenStore::new();
        let order_id = OrderId::new();
        store.admit(new_order(order_id)).await.unwrap();

        let applied = store
            .transition(order_id, KitchenStatus::InProgress)
            .await
            .unwrap();
        let TransitionOutcome::Applied(order) = applied else {
            panic!("expected applied transition");
        };
        assert_eq!(order.status, KitchenStatus::InProgress);
        assert!(order.started_at.is_some());

        store
            .transition(order_id, KitchenStatus::Ready)
            .await
            .unwrap();

        // Late-arriving transitions to earlier states are absorbed.
        let back = store
            .transition(order_id, KitchenStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(back, TransitionOutcome::AlreadyAt(KitchenStatus::Ready));
        assert_eq!(store.history_len(order_id), 3);
    }

    #[tokio::test]
    async fn repeated_transition_writes_one_history_entry() {
        let store = InMemoryKitchenStore::new();
        let order_id = OrderId::new();
        store.admit(new_order(order_id)).await.unwrap();

        store
            .transition(order_id, KitchenStatus::Ready)
            .await
            .unwrap();
        let replay = store
            .transition(order_id, KitchenStatus::Ready)
            .await
            .unwrap();
        assert_eq!(replay, TransitionOutcome::AlreadyAt(KitchenStatus::Ready));
        assert_eq!(store.history_len(order_id), 2);
    }

    #[tokio::test]
    async fn transition_on_unknown_order_is_not_found() {
        let store = InMemoryKitchenStore::new();
        let err = store
            .transition(OrderId::new(), KitchenStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, KitchenStoreError::OrderNotFound));
    }
}
