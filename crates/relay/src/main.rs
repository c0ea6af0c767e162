use std::sync::Arc;

use anyhow::Context;
use tokio_util::task::TaskTracker;

use mensa_auth::Hs256JwtValidator;
use mensa_relay::{
    HttpDeductClient, RedisStockCache, RedisStreamsPublisher, RelayConfig, RelayMetrics,
    RelayState, build_app,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mensa_observability::init("mensa-relay");

    let config = RelayConfig::from_env();

    let cache = RedisStockCache::new(&config.redis_url).context("invalid REDIS_URL")?;
    let publisher = RedisStreamsPublisher::new(&config.redis_url, config.order_stream_key.clone())
        .context("invalid REDIS_URL")?;
    let ledger = HttpDeductClient::new(config.ledger_base_url.clone(), config.ledger_timeout)
        .context("failed to build ledger client")?;

    let tracker = TaskTracker::new();
    let state = RelayState {
        jwt: Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes())),
        cache: Arc::new(cache),
        ledger: Arc::new(ledger),
        publisher: Arc::new(publisher),
        metrics: Arc::new(RelayMetrics::new()),
        tracker: tracker.clone(),
        cache_ttl: config.cache_ttl,
    };

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("relay listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Drain detached publish tasks before exiting.
    tracker.close();
    tracker.wait().await;

    Ok(())
}
