//! `mensa-events` — queue payload schemas shared by the relay and the
//! kitchen processor.
//!
//! Payloads crossing the durable queue are tagged and versioned
//! (`EventEnvelope`) and validated at the consuming boundary: a payload
//! that fails to decode is classified for the dead-letter path instead of
//! crashing the consumer loop.

pub mod envelope;
pub mod message;

pub use envelope::{DecodeError, EventEnvelope};
pub use message::{KitchenStatus, OrderPlaced, OrderStatusChanged, QueueMessage};
