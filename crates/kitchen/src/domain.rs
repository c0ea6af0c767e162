//! Kitchen order lifecycle types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use mensa_core::{ItemId, OrderId, StudentId};
use mensa_events::KitchenStatus;

/// One order's preparation lifecycle.
///
/// `order_id` is the external reference supplied by the relay; exactly one
/// row exists per `order_id` and its existence (together with the recorded
/// status) drives duplicate-delivery handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KitchenOrder {
    pub id: Uuid,
    pub order_id: OrderId,
    pub student_id: StudentId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub status: KitchenStatus,
    pub received_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only record of one status transition, owned by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub kitchen_order_id: Uuid,
    pub status: KitchenStatus,
    pub changed_at: DateTime<Utc>,
}

/// Fields needed to admit a freshly delivered order.
#[derive(Debug, Clone)]
pub struct NewKitchenOrder {
    pub order_id: OrderId,
    pub student_id: StudentId,
    pub item_id: ItemId,
    pub quantity: u32,
}
