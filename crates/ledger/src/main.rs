use std::sync::Arc;

use anyhow::Context;

use mensa_ledger::store::postgres::PostgresStockStore;
use mensa_ledger::{LedgerConfig, LedgerMetrics, LedgerService, StockStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mensa_observability::init("mensa-ledger");

    let config = LedgerConfig::from_env();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;

    let store = PostgresStockStore::new(pool);
    store
        .ensure_schema()
        .await
        .context("failed to ensure ledger schema")?;

    let store: Arc<dyn StockStore> = Arc::new(store);
    let service = Arc::new(LedgerService::new(store, Arc::new(LedgerMetrics::new())));
    let app = mensa_ledger::app::build_app(service);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("ledger listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
