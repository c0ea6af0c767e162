//! Queue message payloads.

use serde::{Deserialize, Serialize};

use mensa_core::{ItemId, OrderId, StudentId};

/// A payload type carried over the durable queue.
///
/// `KIND` tags the payload on the wire; `SCHEMA_VERSION` gates decoding so
/// a consumer never silently misreads a payload written by a newer schema.
pub trait QueueMessage {
    const KIND: &'static str;
    const SCHEMA_VERSION: u32;

    /// Structural validation applied at the queue boundary, beyond what
    /// serde enforces. Malformed messages go to the dead-letter path.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Order event handed from the relay to the kitchen processor after a
/// successful stock deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub student_id: StudentId,
}

impl QueueMessage for OrderPlaced {
    const KIND: &'static str = "order.placed";
    const SCHEMA_VERSION: u32 = 1;

    fn validate(&self) -> Result<(), String> {
        if self.quantity == 0 {
            return Err("quantity must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Preparation lifecycle of a kitchen order. Transitions only move
/// forward: `Received → InProgress → Ready`.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KitchenStatus {
    #[default]
    Received,
    InProgress,
    Ready,
}

impl KitchenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitchenStatus::Received => "RECEIVED",
            KitchenStatus::InProgress => "IN_PROGRESS",
            KitchenStatus::Ready => "READY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECEIVED" => Some(KitchenStatus::Received),
            "IN_PROGRESS" => Some(KitchenStatus::InProgress),
            "READY" => Some(KitchenStatus::Ready),
            _ => None,
        }
    }
}

impl core::fmt::Display for KitchenStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification event emitted by the kitchen on each status transition,
/// consumed by the external notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub student_id: StudentId,
    pub status: KitchenStatus,
}

impl QueueMessage for OrderStatusChanged {
    const KIND: &'static str = "order.status_changed";
    const SCHEMA_VERSION: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&KitchenStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn status_ordering_is_forward_only() {
        assert!(KitchenStatus::Received < KitchenStatus::InProgress);
        assert!(KitchenStatus::InProgress < KitchenStatus::Ready);
    }

    #[test]
    fn zero_quantity_order_fails_boundary_validation() {
        let event = OrderPlaced {
            order_id: OrderId::new(),
            item_id: ItemId::new(),
            quantity: 0,
            student_id: StudentId::new("s-1"),
        };
        assert!(event.validate().is_err());
    }
}
