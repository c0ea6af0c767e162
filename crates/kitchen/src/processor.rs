//! Order preparation pipeline.
//!
//! Converts at-least-once queue delivery into exactly-once preparation:
//! the order row's recorded status decides what a delivery means. A fresh
//! order runs the full pipeline; a redelivery of an order that died
//! mid-preparation resumes from `IN_PROGRESS` instead of being skipped;
//! an order already `READY` is acknowledged as a duplicate with no work.
//! Status transitions gate notifications, so concurrent or repeated
//! deliveries can never emit the same notification twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use mensa_events::{EventEnvelope, KitchenStatus, OrderPlaced, OrderStatusChanged};

use crate::domain::NewKitchenOrder;
use crate::metrics::KitchenMetrics;
use crate::notifier::{StatusNotifier, notify_detached};
use crate::store::{AdmitOutcome, KitchenStore, KitchenStoreError, TransitionOutcome};

/// How long preparation takes, as a function of order size.
#[derive(Debug, Clone, Copy)]
pub struct PrepPlan {
    pub base: Duration,
    pub per_item: Duration,
    pub cap: Duration,
}

impl PrepPlan {
    pub fn duration(&self, quantity: u32) -> Duration {
        (self.base + self.per_item * quantity).min(self.cap)
    }

    /// Zero-duration plan for tests.
    pub fn instant() -> Self {
        Self {
            base: Duration::ZERO,
            per_item: Duration::ZERO,
            cap: Duration::ZERO,
        }
    }
}

/// How a delivery was handled. `Completed` and `Resumed` both end with
/// the order `READY`; `Duplicate` means nothing was done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Completed,
    Resumed,
    Duplicate,
}

/// A processing failure. Propagated to the consumer, which leaves the
/// message unacknowledged so the broker redelivers it.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] KitchenStoreError),
}

pub struct OrderProcessor {
    store: Arc<dyn KitchenStore>,
    notifier: Arc<dyn StatusNotifier>,
    metrics: Arc<KitchenMetrics>,
    tracker: TaskTracker,
    prep: PrepPlan,
}

impl OrderProcessor {
    pub fn new(
        store: Arc<dyn KitchenStore>,
        notifier: Arc<dyn StatusNotifier>,
        metrics: Arc<KitchenMetrics>,
        tracker: TaskTracker,
        prep: PrepPlan,
    ) -> Self {
        Self {
            store,
            notifier,
            metrics,
            tracker,
            prep,
        }
    }

    /// Handle one delivered order event.
    pub async fn process(
        &self,
        event: EventEnvelope<OrderPlaced>,
    ) -> Result<Handled, ProcessError> {
        let order = event.into_payload();
        self.metrics.record_received();

        let admitted = self
            .store
            .admit(NewKitchenOrder {
                order_id: order.order_id,
                student_id: order.student_id.clone(),
                item_id: order.item_id,
                quantity: order.quantity,
            })
            .await?;

        match admitted {
            AdmitOutcome::Created(_) | AdmitOutcome::Existing(KitchenStatus::Received) => {
                self.prepare(&order, true).await?;
                Ok(Handled::Completed)
            }
            AdmitOutcome::Existing(KitchenStatus::InProgress) => {
                // A previous run died after starting preparation; pick up
                // where the recorded status left off.
                warn!(order_id = %order.order_id, "resuming order stranded in IN_PROGRESS");
                self.prepare(&order, false).await?;
                Ok(Handled::Resumed)
            }
            AdmitOutcome::Existing(KitchenStatus::Ready) => {
                self.metrics.record_duplicate();
                debug!(order_id = %order.order_id, "duplicate delivery of a ready order");
                Ok(Handled::Duplicate)
            }
        }
    }

    async fn prepare(&self, order: &OrderPlaced, from_start: bool) -> Result<(), ProcessError> {
        let started = Instant::now();
        self.metrics.enter_preparation();
        let result = self.prepare_inner(order, from_start).await;
        self.metrics.exit_preparation();

        match result {
            Ok(()) => {
                let elapsed = started.elapsed();
                self.metrics.record_processed(elapsed);
                info!(
                    order_id = %order.order_id,
                    student_id = %order.student_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "order ready"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(e)
            }
        }
    }

    async fn prepare_inner(
        &self,
        order: &OrderPlaced,
        from_start: bool,
    ) -> Result<(), ProcessError> {
        if from_start {
            self.advance(order, KitchenStatus::InProgress).await?;
        }

        tokio::time::sleep(self.prep.duration(order.quantity)).await;

        self.advance(order, KitchenStatus::Ready).await?;
        Ok(())
    }

    /// Advance the order and, only if the transition actually applied,
    /// emit the matching notification.
    async fn advance(&self, order: &OrderPlaced, to: KitchenStatus) -> Result<(), ProcessError> {
        if let TransitionOutcome::Applied(_) = self.store.transition(order.order_id, to).await? {
            notify_detached(
                &self.tracker,
                Arc::clone(&self.notifier),
                Arc::clone(&self.metrics),
                EventEnvelope::new(OrderStatusChanged {
                    order_id: order.order_id,
                    student_id: order.student_id.clone(),
                    status: to,
                }),
            );
        }
        Ok(())
    }
}
