//! Observability HTTP surface for the kitchen.
//!
//! The kitchen's real input is the queue; HTTP only exposes health,
//! metrics, and read-only order lookups.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use mensa_core::{ItemId, OrderId, StudentId};
use mensa_events::KitchenStatus;

use crate::metrics::KitchenMetrics;
use crate::store::KitchenStore;

#[derive(Clone)]
pub struct KitchenState {
    pub store: Arc<dyn KitchenStore>,
    pub metrics: Arc<KitchenMetrics>,
}

pub fn build_app(state: KitchenState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/orders/:order_id", get(order))
        .layer(Extension(state))
}

#[derive(Debug, Serialize)]
struct StatusHistoryResponse {
    id: Uuid,
    status: KitchenStatus,
    changed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct KitchenOrderResponse {
    id: Uuid,
    order_id: OrderId,
    student_id: StudentId,
    item_id: ItemId,
    quantity: u32,
    status: KitchenStatus,
    received_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    status_history: Vec<StatusHistoryResponse>,
}

async fn health(Extension(state): Extension<KitchenState>) -> axum::response::Response {
    let database = state.store.ping().await;
    let queue = state.metrics.queue_connected();

    let status = if database && queue {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "service": "mensa-kitchen",
            "database": database,
            "queue": queue,
        })),
    )
        .into_response()
}

async fn metrics(Extension(state): Extension<KitchenState>) -> axum::response::Response {
    (StatusCode::OK, Json(state.metrics.snapshot())).into_response()
}

async fn order(
    Extension(state): Extension<KitchenState>,
    Path(order_id): Path<OrderId>,
) -> axum::response::Response {
    match state.store.order_with_history(order_id).await {
        Ok(Some((order, history))) => {
            let body = KitchenOrderResponse {
                id: order.id,
                order_id: order.order_id,
                student_id: order.student_id,
                item_id: order.item_id,
                quantity: order.quantity,
                status: order.status,
                received_at: order.received_at,
                started_at: order.started_at,
                completed_at: order.completed_at,
                status_history: history
                    .into_iter()
                    .map(|e| StatusHistoryResponse {
                        id: e.id,
                        status: e.status,
                        changed_at: e.changed_at,
                    })
                    .collect(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            "order_not_found",
            format!("no kitchen order for {order_id}"),
        ),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string()),
    }
}

fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
