//! Postgres-backed kitchen store.
//!
//! The unique constraint on `kitchen_orders.order_id` is the duplicate
//! detector: `admit` races are settled by `ON CONFLICT DO NOTHING`, and
//! `transition` serializes per order with `SELECT ... FOR UPDATE` so a
//! concurrent redelivery observes the already-advanced status instead of
//! appending a second history entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use mensa_core::{ItemId, OrderId, StudentId};
use mensa_events::KitchenStatus;

use super::{AdmitOutcome, KitchenStore, KitchenStoreError, TransitionOutcome};
use crate::domain::{KitchenOrder, NewKitchenOrder, StatusHistoryEntry};

#[derive(Debug, Clone)]
pub struct PostgresKitchenStore {
    pool: PgPool,
}

impl PostgresKitchenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the kitchen tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), KitchenStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kitchen_orders (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL UNIQUE,
                student_id TEXT NOT NULL,
                item_id UUID NOT NULL,
                quantity BIGINT NOT NULL CHECK (quantity > 0),
                status TEXT NOT NULL,
                received_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_status_history (
                id UUID PRIMARY KEY,
                kitchen_order_id UUID NOT NULL REFERENCES kitchen_orders(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                changed_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl KitchenStore for PostgresKitchenStore {
    #[instrument(skip(self, order), fields(order_id = %order.order_id), err)]
    async fn admit(&self, order: NewKitchenOrder) -> Result<AdmitOutcome, KitchenStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("admit.begin", e))?;

        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            r#"
            INSERT INTO kitchen_orders (id, order_id, student_id, item_id, quantity, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING id, order_id, student_id, item_id, quantity, status,
                      received_at, started_at, completed_at
            "#,
        )
        .bind(id)
        .bind(order.order_id.as_uuid())
        .bind(order.student_id.as_str())
        .bind(order.item_id.as_uuid())
        .bind(i64::from(order.quantity))
        .bind(KitchenStatus::Received.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("admit.insert", e))?;

        let Some(row) = inserted else {
            // Lost the race (or a genuine redelivery): report where the
            // existing row stands.
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("admit.rollback", e))?;
            let status = sqlx::query("SELECT status FROM kitchen_orders WHERE order_id = $1")
                .bind(order.order_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("admit.status", e))?;
            let status: String = status
                .try_get("status")
                .map_err(|e| map_sqlx_error("admit.status", e))?;
            return Ok(AdmitOutcome::Existing(parse_status(&status)?));
        };

        let created = order_from_row(row)?;
        insert_history(&mut tx, created.id, KitchenStatus::Received).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("admit.commit", e))?;

        Ok(AdmitOutcome::Created(created))
    }

    #[instrument(skip(self), fields(order_id = %order_id, to = %to), err)]
    async fn transition(
        &self,
        order_id: OrderId,
        to: KitchenStatus,
    ) -> Result<TransitionOutcome, KitchenStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("transition.begin", e))?;

        // Exclusive lock scoped to this order's row.
        let row = sqlx::query(
            r#"
            SELECT id, status FROM kitchen_orders
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition.lock", e))?;

        let Some(row) = row else {
            return Err(KitchenStoreError::OrderNotFound);
        };

        let id: Uuid = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("transition.lock", e))?;
        let current: String = row
            .try_get("status")
            .map_err(|e| map_sqlx_error("transition.lock", e))?;
        let current = parse_status(&current)?;

        if current >= to {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("transition.rollback", e))?;
            return Ok(TransitionOutcome::AlreadyAt(current));
        }

        let updated = sqlx::query(
            r#"
            UPDATE kitchen_orders
            SET status = $1,
                started_at = CASE WHEN $1 = 'IN_PROGRESS' THEN now() ELSE started_at END,
                completed_at = CASE WHEN $1 = 'READY' THEN now() ELSE completed_at END
            WHERE id = $2
            RETURNING id, order_id, student_id, item_id, quantity, status,
                      received_at, started_at, completed_at
            "#,
        )
        .bind(to.as_str())
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transition.update", e))?;

        insert_history(&mut tx, id, to).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("transition.commit", e))?;

        Ok(TransitionOutcome::Applied(order_from_row(updated)?))
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    async fn order_with_history(
        &self,
        order_id: OrderId,
    ) -> Result<Option<(KitchenOrder, Vec<StatusHistoryEntry>)>, KitchenStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, student_id, item_id, quantity, status,
                   received_at, started_at, completed_at
            FROM kitchen_orders
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_with_history", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let order = order_from_row(row)?;

        let rows = sqlx::query(
            r#"
            SELECT id, kitchen_order_id, status, changed_at
            FROM order_status_history
            WHERE kitchen_order_id = $1
            ORDER BY changed_at ASC
            "#,
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_with_history", e))?;

        let history = rows
            .into_iter()
            .map(history_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some((order, history)))
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    kitchen_order_id: Uuid,
    status: KitchenStatus,
) -> Result<(), KitchenStoreError> {
    sqlx::query(
        r#"
        INSERT INTO order_status_history (id, kitchen_order_id, status)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(kitchen_order_id)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_history", e))?;

    Ok(())
}

fn order_from_row(row: sqlx::postgres::PgRow) -> Result<KitchenOrder, KitchenStoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row.id", e))?;
    let order_id: Uuid = row
        .try_get("order_id")
        .map_err(|e| map_sqlx_error("row.order_id", e))?;
    let student_id: String = row
        .try_get("student_id")
        .map_err(|e| map_sqlx_error("row.student_id", e))?;
    let item_id: Uuid = row
        .try_get("item_id")
        .map_err(|e| map_sqlx_error("row.item_id", e))?;
    let quantity: i64 = row
        .try_get("quantity")
        .map_err(|e| map_sqlx_error("row.quantity", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error("row.status", e))?;
    let received_at: DateTime<Utc> = row
        .try_get("received_at")
        .map_err(|e| map_sqlx_error("row.received_at", e))?;
    let started_at: Option<DateTime<Utc>> = row
        .try_get("started_at")
        .map_err(|e| map_sqlx_error("row.started_at", e))?;
    let completed_at: Option<DateTime<Utc>> = row
        .try_get("completed_at")
        .map_err(|e| map_sqlx_error("row.completed_at", e))?;

    Ok(KitchenOrder {
        id,
        order_id: OrderId::from_uuid(order_id),
        student_id: StudentId::new(student_id),
        item_id: ItemId::from_uuid(item_id),
        quantity: quantity.max(0) as u32,
        status: parse_status(&status)?,
        received_at,
        started_at,
        completed_at,
    })
}

fn history_from_row(row: sqlx::postgres::PgRow) -> Result<StatusHistoryEntry, KitchenStoreError> {
    let id: Uuid = row.try_get("id").map_err(|e| map_sqlx_error("row.id", e))?;
    let kitchen_order_id: Uuid = row
        .try_get("kitchen_order_id")
        .map_err(|e| map_sqlx_error("row.kitchen_order_id", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| map_sqlx_error("row.status", e))?;
    let changed_at: DateTime<Utc> = row
        .try_get("changed_at")
        .map_err(|e| map_sqlx_error("row.changed_at", e))?;

    Ok(StatusHistoryEntry {
        id,
        kitchen_order_id,
        status: parse_status(&status)?,
        changed_at,
    })
}

fn parse_status(raw: &str) -> Result<KitchenStatus, KitchenStoreError> {
    KitchenStatus::parse(raw)
        .ok_or_else(|| KitchenStoreError::Storage(format!("unknown status in store: {raw}")))
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> KitchenStoreError {
    KitchenStoreError::Storage(format!("{operation}: {e}"))
}
