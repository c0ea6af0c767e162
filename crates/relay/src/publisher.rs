//! Fire-and-forget hand-off of order events to the kitchen's durable queue.
//!
//! The publish runs as a detached task: the HTTP response returns once the
//! task is scheduled, and a delivery failure is metered and logged without
//! ever rolling back the committed stock deduction. Detached tasks are
//! registered with a `TaskTracker` so shutdown can drain them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use mensa_events::{EventEnvelope, OrderPlaced};

use crate::metrics::RelayMetrics;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unreachable: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Command(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait OrderEventPublisher: Send + Sync {
    async fn publish(&self, event: EventEnvelope<OrderPlaced>) -> Result<(), PublishError>;
}

/// Redis Streams publisher (XADD to the order stream).
#[derive(Clone)]
pub struct RedisStreamsPublisher {
    client: redis::Client,
    stream_key: String,
}

impl RedisStreamsPublisher {
    pub fn new(redis_url: &str, stream_key: impl Into<String>) -> Result<Self, PublishError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| PublishError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            stream_key: stream_key.into(),
        })
    }
}

#[async_trait]
impl OrderEventPublisher for RedisStreamsPublisher {
    async fn publish(&self, event: EventEnvelope<OrderPlaced>) -> Result<(), PublishError> {
        let payload = event
            .to_json()
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("kind")
            .arg(event.kind())
            .arg("payload")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }
}

/// Schedule a publish without awaiting its outcome.
pub fn publish_detached(
    tracker: &TaskTracker,
    publisher: Arc<dyn OrderEventPublisher>,
    metrics: Arc<RelayMetrics>,
    event: EventEnvelope<OrderPlaced>,
) {
    let order_id = event.payload().order_id;
    tracker.spawn(async move {
        match publisher.publish(event).await {
            Ok(()) => {
                info!(order_id = %order_id, "order event published to kitchen queue");
            }
            Err(e) => {
                metrics.record_downstream_failure();
                error!(order_id = %order_id, error = %e, "failed to publish order event");
            }
        }
    });
}
