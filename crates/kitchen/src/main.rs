use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;

use mensa_kitchen::{
    KitchenConfig, KitchenMetrics, KitchenState, OrderProcessor, PostgresKitchenStore,
    QueueConsumer, RedisStreamsNotifier, build_app,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mensa_observability::init("mensa-kitchen");

    let config = KitchenConfig::from_env();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;

    let store = PostgresKitchenStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to ensure kitchen schema")?;
    let store: Arc<dyn mensa_kitchen::KitchenStore> = Arc::new(store);

    let notifier =
        RedisStreamsNotifier::new(&config.redis_url, config.notification_stream_key.clone())
            .context("invalid REDIS_URL")?;
    let metrics = Arc::new(KitchenMetrics::new());
    let notify_tracker = TaskTracker::new();

    let processor = Arc::new(OrderProcessor::new(
        Arc::clone(&store),
        Arc::new(notifier),
        Arc::clone(&metrics),
        notify_tracker.clone(),
        config.prep,
    ));

    let consumer = QueueConsumer::new(
        &config.redis_url,
        config.order_stream_key.clone(),
        config.dead_letter_stream_key.clone(),
        config.consumer_group.clone(),
        config.consumer_name.clone(),
        config.batch_size,
        config.claim_min_idle,
        config.max_deliveries,
        config.reconnect_delay,
        config.max_in_flight,
    )
    .context("invalid REDIS_URL")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_handle = tokio::spawn(consumer.run(
        Arc::clone(&processor),
        Arc::clone(&metrics),
        shutdown_rx,
    ));

    let app = build_app(KitchenState {
        store,
        metrics: Arc::clone(&metrics),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("kitchen listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop consuming, wait for in-flight preparations, then drain any
    // detached notification publishes.
    let _ = shutdown_tx.send(true);
    let _ = consumer_handle.await;
    notify_tracker.close();
    notify_tracker.wait().await;

    Ok(())
}
