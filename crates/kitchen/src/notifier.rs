//! Fire-and-forget status notifications.
//!
//! Each status transition emits an `OrderStatusChanged` event for the
//! external notifier. Publishing runs as a detached task: a failure is
//! metered and logged but never fails the preparation pipeline. Detached
//! tasks are registered with a `TaskTracker` so shutdown can drain them.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use mensa_events::{EventEnvelope, OrderStatusChanged};

use crate::metrics::KitchenMetrics;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("broker unreachable: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Command(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait StatusNotifier: Send + Sync {
    async fn notify(&self, event: EventEnvelope<OrderStatusChanged>) -> Result<(), NotifyError>;
}

/// Redis Streams notifier (XADD to the notification stream).
#[derive(Clone)]
pub struct RedisStreamsNotifier {
    client: redis::Client,
    stream_key: String,
}

impl RedisStreamsNotifier {
    pub fn new(redis_url: &str, stream_key: impl Into<String>) -> Result<Self, NotifyError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| NotifyError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            stream_key: stream_key.into(),
        })
    }
}

#[async_trait]
impl StatusNotifier for RedisStreamsNotifier {
    async fn notify(&self, event: EventEnvelope<OrderStatusChanged>) -> Result<(), NotifyError> {
        let payload = event
            .to_json()
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| NotifyError::Connection(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("kind")
            .arg(event.kind())
            .arg("payload")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| NotifyError::Command(format!("XADD failed: {e}")))?;

        Ok(())
    }
}

/// Schedule a notification without awaiting its outcome.
pub fn notify_detached(
    tracker: &TaskTracker,
    notifier: Arc<dyn StatusNotifier>,
    metrics: Arc<KitchenMetrics>,
    event: EventEnvelope<OrderStatusChanged>,
) {
    let order_id = event.payload().order_id;
    let status = event.payload().status;
    tracker.spawn(async move {
        match notifier.notify(event).await {
            Ok(()) => {
                debug!(order_id = %order_id, status = %status, "status notification published");
            }
            Err(e) => {
                metrics.record_notification_failure();
                error!(order_id = %order_id, status = %status, error = %e,
                    "failed to publish status notification");
            }
        }
    });
}
