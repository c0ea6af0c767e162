//! Envelope for a queue message, carrying identity and schema metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::message::QueueMessage;

/// Envelope for a queue payload.
///
/// This is the unit that crosses the durable queue. `kind` and
/// `schema_version` are checked at the consuming boundary before the
/// payload is interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    kind: String,
    schema_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

/// Why an inbound queue message could not be accepted.
///
/// Every variant is terminal for the message: decoding is deterministic,
/// so redelivery would fail identically. Consumers route these to the
/// dead-letter path rather than nack-looping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unexpected message kind: got {got}, want {want}")]
    KindMismatch { got: String, want: &'static str },

    #[error("unsupported schema version {got} (supported: {supported})")]
    UnsupportedVersion { got: u32, supported: u32 },

    #[error("payload failed validation: {0}")]
    Invalid(String),
}

impl<E: QueueMessage> EventEnvelope<E> {
    /// Wrap a payload for publishing, stamping a fresh event id.
    pub fn new(payload: E) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind: E::KIND.to_string(),
            schema_version: E::SCHEMA_VERSION,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: QueueMessage + Serialize> EventEnvelope<E> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<E: QueueMessage + DeserializeOwned> EventEnvelope<E> {
    /// Decode and validate an inbound message at the queue boundary.
    pub fn from_json(raw: &str) -> Result<Self, DecodeError> {
        let envelope: EventEnvelope<E> =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        if envelope.kind != E::KIND {
            return Err(DecodeError::KindMismatch {
                got: envelope.kind,
                want: E::KIND,
            });
        }
        if envelope.schema_version != E::SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                got: envelope.schema_version,
                supported: E::SCHEMA_VERSION,
            });
        }
        envelope.payload.validate().map_err(DecodeError::Invalid)?;

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{OrderPlaced, QueueMessage};
    use mensa_core::{ItemId, OrderId, StudentId};

    fn order() -> OrderPlaced {
        OrderPlaced {
            order_id: OrderId::new(),
            item_id: ItemId::new(),
            quantity: 2,
            student_id: StudentId::new("s-42"),
        }
    }

    #[test]
    fn envelope_survives_the_wire() {
        let envelope = EventEnvelope::new(order());
        let raw = envelope.to_json().unwrap();
        let decoded = EventEnvelope::<OrderPlaced>::from_json(&raw).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = EventEnvelope::<OrderPlaced>::from_json("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn future_schema_version_is_rejected() {
        let mut envelope = EventEnvelope::new(order());
        envelope.schema_version = OrderPlaced::SCHEMA_VERSION + 1;
        let raw = envelope.to_json().unwrap();
        let err = EventEnvelope::<OrderPlaced>::from_json(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion { .. }));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let mut envelope = EventEnvelope::new(order());
        envelope.kind = "order.cancelled".to_string();
        let raw = envelope.to_json().unwrap();
        let err = EventEnvelope::<OrderPlaced>::from_json(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));
    }

    #[test]
    fn invalid_payload_is_rejected_at_the_boundary() {
        let mut payload = order();
        payload.quantity = 0;
        let envelope = EventEnvelope::new(payload);
        let raw = envelope.to_json().unwrap();
        let err = EventEnvelope::<OrderPlaced>::from_json(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid(_)));
    }
}
