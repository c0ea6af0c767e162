//! Kitchen order storage seam.
//!
//! Both implementations enforce the same two rules the processor relies
//! on: at most one order row per `order_id`, and forward-only status
//! transitions. A transition to a status the order has already reached
//! (or passed) is reported as a no-op, never an error, so duplicate
//! deliveries cannot double-write history.

use async_trait::async_trait;
use thiserror::Error;

use mensa_core::OrderId;
use mensa_events::KitchenStatus;

use crate::domain::{KitchenOrder, NewKitchenOrder, StatusHistoryEntry};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryKitchenStore;
pub use postgres::PostgresKitchenStore;

#[derive(Debug, Error)]
pub enum KitchenStoreError {
    /// No kitchen order exists for the requested `order_id`.
    #[error("kitchen order not found")]
    OrderNotFound,

    /// Backend failure (connection, constraint anomaly). Retryable via
    /// queue redelivery: all mutations are idempotent.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Result of admitting a delivered order event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// First delivery: the order row was created in `RECEIVED` and the
    /// first history entry written.
    Created(KitchenOrder),

    /// A row already existed; its recorded status tells the processor
    /// where to resume.
    Existing(KitchenStatus),
}

/// Result of a forward-only status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status advanced and a history entry was appended.
    Applied(KitchenOrder),

    /// The order was already at (or past) the requested status. Nothing
    /// was written.
    AlreadyAt(KitchenStatus),
}

#[async_trait]
pub trait KitchenStore: Send + Sync {
    /// Create the order row in `RECEIVED` if no row exists for its
    /// `order_id`, or report the existing row's status.
    async fn admit(&self, order: NewKitchenOrder) -> Result<AdmitOutcome, KitchenStoreError>;

    /// Advance the order to `to`, appending a history entry and stamping
    /// `started_at` / `completed_at` as appropriate. Never regresses.
    async fn transition(
        &self,
        order_id: OrderId,
        to: KitchenStatus,
    ) -> Result<TransitionOutcome, KitchenStoreError>;

    /// The order and its full transition history, oldest first.
    async fn order_with_history(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(KitchenOrder, Vec<StatusHistoryEntry>)>, KitchenStoreError>;

    /// Backend reachability probe for the health endpoint.
    async fn ping(&self) -> bool;
}
