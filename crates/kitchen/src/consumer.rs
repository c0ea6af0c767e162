//! Durable-queue consumer loop over Redis Streams.
//!
//! One consumption stream per process, read through a consumer group so
//! delivery is at-least-once: a message is XACKed only after its handler
//! returns Ok, and unacknowledged messages are reclaimed with XCLAIM once
//! their idle time passes the redelivery threshold. Malformed messages
//! and messages that exhaust their delivery budget go to a dead-letter
//! stream instead of looping forever.
//!
//! The loop never crashes on a broken connection: it reconnects on a
//! fixed delay until shutdown is signalled, then drains in-flight
//! handlers before releasing the connection. A semaphore bounds how many
//! preparations run at once, providing backpressure against the broker.

use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use tokio::sync::{Semaphore, watch};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use mensa_events::{EventEnvelope, OrderPlaced};

use crate::metrics::KitchenMetrics;
use crate::processor::OrderProcessor;

/// How long XREADGROUP blocks waiting for new entries. Also bounds how
/// quickly the loop notices a shutdown signal.
const READ_BLOCK_MS: usize = 1000;

#[derive(Debug, Clone)]
struct Delivery {
    id: String,
    raw: Option<String>,
    /// True when the broker has already delivered this message more times
    /// than the budget allows; routed straight to the dead-letter stream.
    exhausted: bool,
}

pub struct QueueConsumer {
    client: redis::Client,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer_name: String,
    batch_size: usize,
    claim_min_idle: Duration,
    max_deliveries: usize,
    reconnect_delay: Duration,
    max_in_flight: usize,
}

impl QueueConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        redis_url: &str,
        stream_key: impl Into<String>,
        dlq_key: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
        batch_size: usize,
        claim_min_idle: Duration,
        max_deliveries: usize,
        reconnect_delay: Duration,
        max_in_flight: usize,
    ) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            stream_key: stream_key.into(),
            dlq_key: dlq_key.into(),
            group: group.into(),
            consumer_name: consumer_name.into(),
            batch_size,
            claim_min_idle,
            max_deliveries,
            reconnect_delay,
            max_in_flight,
        })
    }

    /// Consume until shutdown is signalled. Never returns early on broker
    /// failure; reconnects on a fixed delay instead.
    pub async fn run(
        self,
        processor: Arc<OrderProcessor>,
        metrics: Arc<KitchenMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let in_flight = TaskTracker::new();

        'reconnect: while !*shutdown.borrow() {
            let (mut reader, ack_conn) = match self.connect().await {
                Ok(pair) => pair,
                Err(e) => {
                    metrics.set_queue_connected(false);
                    warn!(
                        error = %e,
                        delay_secs = self.reconnect_delay.as_secs(),
                        "queue connection failed; retrying"
                    );
                    if wait_or_shutdown(&mut shutdown, self.reconnect_delay).await {
                        break;
                    }
                    continue;
                }
            };
            metrics.set_queue_connected(true);
            info!(
                stream = %self.stream_key,
                group = %self.group,
                consumer = %self.consumer_name,
                "consuming order stream"
            );

            loop {
                if *shutdown.borrow() {
                    break 'reconnect;
                }

                let deliveries = match self.fetch(&mut reader).await {
                    Ok(deliveries) => deliveries,
                    Err(e) => {
                        metrics.set_queue_connected(false);
                        warn!(
                            error = %e,
                            delay_secs = self.reconnect_delay.as_secs(),
                            "queue read failed; reconnecting"
                        );
                        if wait_or_shutdown(&mut shutdown, self.reconnect_delay).await {
                            break 'reconnect;
                        }
                        continue 'reconnect;
                    }
                };

                for delivery in deliveries {
                    // Backpressure: wait for a preparation slot before
                    // taking on the next message.
                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                        break 'reconnect;
                    };
                    let ctx = DeliveryContext {
                        processor: Arc::clone(&processor),
                        metrics: Arc::clone(&metrics),
                        ack_conn: ack_conn.clone(),
                        stream_key: self.stream_key.clone(),
                        dlq_key: self.dlq_key.clone(),
                        group: self.group.clone(),
                    };
                    in_flight.spawn(async move {
                        let _permit = permit;
                        handle_delivery(ctx, delivery).await;
                    });
                }
            }
        }

        // Graceful drain: wait for in-progress handlers before releasing
        // the connection.
        in_flight.close();
        in_flight.wait().await;
        metrics.set_queue_connected(false);
        info!("consumer stopped");
    }

    async fn connect(
        &self,
    ) -> Result<(MultiplexedConnection, MultiplexedConnection), redis::RedisError> {
        // Separate connections: the reader blocks in XREADGROUP, acks must
        // not queue behind it.
        let mut reader = self.client.get_multiplexed_async_connection().await?;
        let ack = self.client.get_multiplexed_async_connection().await?;
        self.ensure_group(&mut reader).await?;
        Ok((reader, ack))
    }

    async fn ensure_group(&self, conn: &mut MultiplexedConnection) -> Result<(), redis::RedisError> {
        match conn
            .xgroup_create_mkstream::<_, _, _, String>(&self.stream_key, &self.group, "0")
            .await
        {
            Ok(_) => Ok(()),
            // Group already exists from a previous run.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stale pending entries first (redelivery), then new entries.
    async fn fetch(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Vec<Delivery>, redis::RedisError> {
        let stale = self.claim_stale(conn).await?;
        if !stale.is_empty() {
            return Ok(stale);
        }
        self.read_new(conn).await
    }

    async fn claim_stale(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Vec<Delivery>, redis::RedisError> {
        let pending: StreamPendingCountReply = conn
            .xpending_count(&self.stream_key, &self.group, "-", "+", self.batch_size)
            .await?;
        if pending.ids.is_empty() {
            return Ok(vec![]);
        }

        let delivery_counts: std::collections::HashMap<String, usize> = pending
            .ids
            .iter()
            .map(|p| (p.id.clone(), p.times_delivered))
            .collect();
        let ids: Vec<String> = pending.ids.into_iter().map(|p| p.id).collect();

        // XCLAIM only returns entries idle longer than the threshold, so
        // messages still being worked on elsewhere are left alone.
        let claimed: StreamClaimReply = conn
            .xclaim(
                &self.stream_key,
                &self.group,
                &self.consumer_name,
                self.claim_min_idle.as_millis() as usize,
                &ids,
            )
            .await?;

        Ok(claimed
            .ids
            .into_iter()
            .map(|entry| {
                let deliveries = delivery_counts.get(&entry.id).copied().unwrap_or(1);
                Delivery {
                    raw: entry.get::<String>("payload"),
                    exhausted: deliveries > self.max_deliveries,
                    id: entry.id,
                }
            })
            .collect())
    }

    async fn read_new(
        &self,
        conn: &mut MultiplexedConnection,
    ) -> Result<Vec<Delivery>, redis::RedisError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(self.batch_size)
            .block(READ_BLOCK_MS);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream_key], &[">"], &options)
            .await?;

        Ok(reply
            .keys
            .into_iter()
            .flat_map(|key| key.ids)
            .map(|entry| Delivery {
                raw: entry.get::<String>("payload"),
                exhausted: false,
                id: entry.id,
            })
            .collect())
    }
}

#[derive(Clone)]
struct DeliveryContext {
    processor: Arc<OrderProcessor>,
    metrics: Arc<KitchenMetrics>,
    ack_conn: MultiplexedConnection,
    stream_key: String,
    dlq_key: String,
    group: String,
}

/// Process one delivery to a terminal outcome: ack, dead-letter, or leave
/// pending for redelivery.
async fn handle_delivery(mut ctx: DeliveryContext, delivery: Delivery) {
    if delivery.exhausted {
        dead_letter(
            &mut ctx,
            &delivery,
            "delivery budget exhausted".to_string(),
        )
        .await;
        return;
    }

    let Some(raw) = delivery.raw.clone() else {
        dead_letter(&mut ctx, &delivery, "missing payload field".to_string()).await;
        return;
    };

    let event = match EventEnvelope::<OrderPlaced>::from_json(&raw) {
        Ok(event) => event,
        Err(e) => {
            // Decoding is deterministic; redelivery would fail identically.
            dead_letter(&mut ctx, &delivery, e.to_string()).await;
            return;
        }
    };

    match ctx.processor.process(event).await {
        Ok(_) => acknowledge(&mut ctx, &delivery.id).await,
        Err(e) => {
            // Leave unacknowledged: the broker redelivers once the entry
            // goes stale, and the idempotent processor absorbs the replay.
            warn!(message_id = %delivery.id, error = %e, "processing failed; awaiting redelivery");
        }
    }
}

async fn acknowledge(ctx: &mut DeliveryContext, message_id: &str) {
    if let Err(e) = ctx
        .ack_conn
        .xack::<_, _, _, u64>(&ctx.stream_key, &ctx.group, &[message_id])
        .await
    {
        // The message stays pending and will be redelivered; the
        // idempotency check turns that into a counted duplicate.
        warn!(message_id = %message_id, error = %e, "XACK failed");
    }
}

async fn dead_letter(ctx: &mut DeliveryContext, delivery: &Delivery, reason: String) {
    let payload = delivery.raw.clone().unwrap_or_default();
    let failed_at = chrono::Utc::now().to_rfc3339();
    let result = ctx
        .ack_conn
        .xadd::<_, _, _, _, String>(
            &ctx.dlq_key,
            "*",
            &[
                ("original_message_id", delivery.id.as_str()),
                ("error", reason.as_str()),
                ("failed_at", failed_at.as_str()),
                ("payload", payload.as_str()),
            ],
        )
        .await;

    match result {
        Ok(_) => {
            ctx.metrics.record_dead_letter();
            warn!(message_id = %delivery.id, reason = %reason, "message sent to dead-letter stream");
            acknowledge(ctx, &delivery.id).await;
        }
        Err(e) => {
            // Keep the message pending rather than losing it.
            error!(message_id = %delivery.id, error = %e, "dead-letter XADD failed");
        }
    }
}

/// Sleep for `delay`, returning early with `true` if shutdown fires.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
