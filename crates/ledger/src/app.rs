//! HTTP surface of the stock ledger.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use mensa_core::{CoreError, ItemId, OrderId, TransactionId};

use crate::service::LedgerService;

pub fn build_app(service: Arc<LedgerService>) -> Router {
    Router::new()
        .route("/stock/deduct", post(deduct))
        .route("/stock/transactions/:order_id", get(transactions_by_order))
        .route("/stock/transactions", get(list_transactions))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(Extension(service))
}

#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct DeductResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub transaction_id: TransactionId,
    pub remaining_stock: u32,
}

async fn deduct(
    Extension(service): Extension<Arc<LedgerService>>,
    Json(body): Json<DeductRequest>,
) -> axum::response::Response {
    match service
        .deduct(body.order_id, body.item_id, body.quantity)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(DeductResponse {
                status: "success",
                message: if outcome.replayed {
                    "stock already deducted"
                } else {
                    "stock deducted"
                },
                transaction_id: outcome.transaction_id,
                remaining_stock: outcome.remaining_stock,
            }),
        )
            .into_response(),
        Err(e) => core_error_to_response(e),
    }
}

async fn transactions_by_order(
    Extension(service): Extension<Arc<LedgerService>>,
    Path(order_id): Path<OrderId>,
) -> axum::response::Response {
    match service.transactions_by_order(order_id).await {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(e) => core_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub item_id: Option<ItemId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

async fn list_transactions(
    Extension(service): Extension<Arc<LedgerService>>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    match service
        .list_transactions(
            query.item_id,
            query.limit.unwrap_or(20),
            query.offset.unwrap_or(0),
        )
        .await
    {
        Ok(transactions) => (StatusCode::OK, Json(transactions)).into_response(),
        Err(e) => core_error_to_response(e),
    }
}

async fn health(Extension(service): Extension<Arc<LedgerService>>) -> axum::response::Response {
    let database = service.store().ping().await;
    let status = if database { "ok" } else { "degraded" };
    let code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": "mensa-ledger",
            "database": database,
            "deductions_in_flight": service.metrics().in_flight(),
        })),
    )
        .into_response()
}

async fn metrics(Extension(service): Extension<Arc<LedgerService>>) -> axum::response::Response {
    (StatusCode::OK, Json(service.metrics().snapshot())).into_response()
}

pub fn core_error_to_response(err: CoreError) -> axum::response::Response {
    match err {
        CoreError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        CoreError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        CoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        CoreError::TransientInfra(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
        CoreError::DownstreamUnavailable(msg) => {
            json_error(StatusCode::BAD_GATEWAY, "downstream_unavailable", msg)
        }
    }
}

pub fn json_error(
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
