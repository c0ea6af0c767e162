//! Postgres-backed stock store.
//!
//! ## Error mapping
//!
//! SQLx errors are mapped to `StockStoreError` as follows:
//!
//! | SQLx error | Postgres code | StockStoreError | Scenario |
//! |------------|---------------|-----------------|----------|
//! | Database (unique violation) | `23505` | `Storage` | Insert raced past the row lock (anomaly; caller retries and hits the fast path) |
//! | Database (check violation) | `23514` | `Storage` | Quantity would go negative (guarded earlier; defense stays in the schema) |
//! | Database (other) | any | `Storage` | Other database errors |
//! | PoolTimedOut / Io / Tls | n/a | `Storage` | Connection-level failures |
//!
//! ## Locking
//!
//! `deduct` serializes per inventory row with `SELECT ... FOR UPDATE`.
//! Each deduction touches exactly one row, so there is no lock ordering
//! between rows and no deadlock potential; a lock wait that exceeds the
//! transaction timeout surfaces as a retryable `Storage` error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use mensa_core::{ItemId, OrderId, TransactionId};

use super::{StockStore, StockStoreError};
use crate::domain::{DeductOutcome, StockTransaction};

#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StockStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                price_cents BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                id UUID PRIMARY KEY,
                item_id UUID NOT NULL UNIQUE REFERENCES items(id),
                quantity BIGINT NOT NULL CHECK (quantity >= 0),
                version BIGINT NOT NULL DEFAULT 1,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_transactions (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL,
                item_id UUID NOT NULL REFERENCES items(id),
                quantity_deducted BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (order_id, item_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }

    async fn find_transaction(
        &self,
        order_id: OrderId,
        item_id: ItemId,
    ) -> Result<Option<StockTransaction>, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, item_id, quantity_deducted, created_at
            FROM stock_transactions
            WHERE order_id = $1 AND item_id = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_transaction", e))?;

        row.map(transaction_from_row).transpose()
    }

    async fn find_transaction_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        item_id: ItemId,
    ) -> Result<Option<StockTransaction>, StockStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, item_id, quantity_deducted, created_at
            FROM stock_transactions
            WHERE order_id = $1 AND item_id = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(item_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("find_transaction", e))?;

        row.map(transaction_from_row).transpose()
    }

    async fn current_quantity(&self, item_id: ItemId) -> Result<u32, StockStoreError> {
        let row = sqlx::query("SELECT quantity FROM inventory WHERE item_id = $1")
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_quantity", e))?;

        match row {
            Some(row) => {
                let quantity: i64 = row
                    .try_get("quantity")
                    .map_err(|e| map_sqlx_error("current_quantity", e))?;
                Ok(quantity.max(0) as u32)
            }
            None => Err(StockStoreError::ItemNotFound),
        }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(skip(self), fields(order_id = %order_id, item_id = %item_id, quantity), err)]
    async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductOutcome, StockStoreError> {
        // Cheap idempotent fast path, no lock taken.
        if let Some(existing) = self.find_transaction(order_id, item_id).await? {
            if existing.quantity_deducted != quantity {
                warn!(
                    original = existing.quantity_deducted,
                    requested = quantity,
                    "replayed deduction with a different quantity; returning original outcome"
                );
            }
            let remaining = self.current_quantity(item_id).await?;
            return Ok(DeductOutcome {
                transaction_id: existing.id,
                remaining_stock: remaining,
                replayed: true,
            });
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("deduct.begin", e))?;

        // Exclusive lock scoped to this item's inventory row.
        let inventory = sqlx::query(
            r#"
            SELECT id, quantity, version
            FROM inventory
            WHERE item_id = $1
            FOR UPDATE
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deduct.lock", e))?;

        let Some(inventory) = inventory else {
            return Err(StockStoreError::ItemNotFound);
        };

        let inventory_id: Uuid = inventory
            .try_get("id")
            .map_err(|e| map_sqlx_error("deduct.lock", e))?;
        let available: i64 = inventory
            .try_get("quantity")
            .map_err(|e| map_sqlx_error("deduct.lock", e))?;

        // Closes the race where two first-time requests for the same key
        // arrive together: the loser re-checks under the lock and returns
        // the winner's result instead of deducting twice.
        if let Some(existing) = Self::find_transaction_in_tx(&mut tx, order_id, item_id).await? {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("deduct.rollback", e))?;
            return Ok(DeductOutcome {
                transaction_id: existing.id,
                remaining_stock: available.max(0) as u32,
                replayed: true,
            });
        }

        if available < i64::from(quantity) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("deduct.rollback", e))?;
            return Err(StockStoreError::InsufficientStock {
                requested: quantity,
                available: available.max(0) as u32,
            });
        }

        sqlx::query(
            r#"
            UPDATE inventory
            SET quantity = quantity - $1, version = version + 1, updated_at = now()
            WHERE id = $2
            "#,
        )
        .bind(i64::from(quantity))
        .bind(inventory_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deduct.update", e))?;

        let transaction_id = TransactionId::new();
        sqlx::query(
            r#"
            INSERT INTO stock_transactions (id, order_id, item_id, quantity_deducted)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(transaction_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(item_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("deduct.insert", e))?;

        // Decrement and ledger insert commit together or not at all.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("deduct.commit", e))?;

        Ok(DeductOutcome {
            transaction_id,
            remaining_stock: (available - i64::from(quantity)) as u32,
            replayed: false,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn transactions_by_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<StockTransaction>, StockStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item_id, quantity_deducted, created_at
            FROM stock_transactions
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions_by_order", e))?;

        rows.into_iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_transactions(
        &self,
        item_id: Option<ItemId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StockTransaction>, StockStoreError> {
        let rows = match item_id {
            Some(item_id) => {
                sqlx::query(
                    r#"
                    SELECT id, order_id, item_id, quantity_deducted, created_at
                    FROM stock_transactions
                    WHERE item_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(item_id.as_uuid())
                .bind(i64::from(limit))
                .bind(i64::from(offset))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, order_id, item_id, quantity_deducted, created_at
                    FROM stock_transactions
                    ORDER BY created_at DESC
                    LIMIT $1 OFFSET $2
                    "#,
                )
                .bind(i64::from(limit))
                .bind(i64::from(offset))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| map_sqlx_error("list_transactions", e))?;

        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn transaction_from_row(row: sqlx::postgres::PgRow) -> Result<StockTransaction, StockStoreError> {
    let id: Uuid = row
        .try_get("id")
        .map_err(|e| map_sqlx_error("row.id", e))?;
    let order_id: Uuid = row
        .try_get("order_id")
        .map_err(|e| map_sqlx_error("row.order_id", e))?;
    let item_id: Uuid = row
        .try_get("item_id")
        .map_err(|e| map_sqlx_error("row.item_id", e))?;
    let quantity_deducted: i64 = row
        .try_get("quantity_deducted")
        .map_err(|e| map_sqlx_error("row.quantity_deducted", e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| map_sqlx_error("row.created_at", e))?;

    Ok(StockTransaction {
        id: TransactionId::from_uuid(id),
        order_id: OrderId::from_uuid(order_id),
        item_id: ItemId::from_uuid(item_id),
        quantity_deducted: quantity_deducted.max(0) as u32,
        created_at,
    })
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> StockStoreError {
    StockStoreError::Storage(format!("{operation}: {e}"))
}
