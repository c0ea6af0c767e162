//! The `/order` handler: one pass through
//! `CACHE_CHECK → DEDUCTING → PUBLISHING`, with early exits to rejection.
//! (Authentication happened in the middleware before we get here.)

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use mensa_core::{ItemId, OrderId};
use mensa_events::{EventEnvelope, OrderPlaced};

use crate::app::{RelayState, json_error};
use crate::ledger_client::DeductError;
use crate::middleware::StudentContext;
use crate::publisher::publish_detached;

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub status: &'static str,
}

pub async fn place_order(
    Extension(state): Extension<RelayState>,
    Extension(student): Extension<StudentContext>,
    Json(body): Json<OrderRequest>,
) -> axum::response::Response {
    let start = Instant::now();

    if body.quantity == 0 {
        return reject(
            &state,
            start,
            json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "quantity must be greater than 0",
            ),
        );
    }

    // CACHE_CHECK: only an exact cached zero short-circuits; misses and
    // backend failures fall through to the ledger.
    if let Some(0) = state.cache.get(body.item_id).await {
        state.metrics.record_cache_short_circuit();
        return reject(
            &state,
            start,
            json_error(StatusCode::CONFLICT, "out_of_stock", "item is out of stock"),
        );
    }

    // DEDUCTING: bounded synchronous call, three failure shapes.
    let outcome = match state
        .ledger
        .deduct(body.order_id, body.item_id, body.quantity)
        .await
    {
        Ok(outcome) => outcome,
        Err(DeductError::Timeout) => {
            state.metrics.record_downstream_failure();
            return reject(
                &state,
                start,
                json_error(
                    StatusCode::GATEWAY_TIMEOUT,
                    "ledger_timeout",
                    "stock ledger did not respond in time",
                ),
            );
        }
        Err(DeductError::InsufficientStock) => {
            // Remember the exhaustion so subsequent requests short-circuit
            // for the TTL window.
            state.cache.set(body.item_id, 0, state.cache_ttl).await;
            return reject(
                &state,
                start,
                json_error(StatusCode::CONFLICT, "out_of_stock", "insufficient stock"),
            );
        }
        Err(DeductError::Unavailable(msg)) => {
            state.metrics.record_downstream_failure();
            return reject(
                &state,
                start,
                json_error(StatusCode::BAD_GATEWAY, "ledger_unavailable", msg),
            );
        }
    };

    // Best-effort cache refresh with the ledger's remaining count.
    if let Some(remaining) = outcome.remaining_stock {
        state.cache.set(body.item_id, remaining, state.cache_ttl).await;
    }

    // PUBLISHING: detached hand-off; the response does not wait for it and
    // a failure never unwinds the deduction.
    let event = EventEnvelope::new(OrderPlaced {
        order_id: body.order_id,
        item_id: body.item_id,
        quantity: body.quantity,
        student_id: student.student_id().clone(),
    });
    publish_detached(
        &state.tracker,
        Arc::clone(&state.publisher),
        Arc::clone(&state.metrics),
        event,
    );

    let elapsed = start.elapsed();
    state.metrics.record_success();
    state.metrics.record_latency(elapsed);

    info!(
        order_id = %body.order_id,
        student_id = %student.student_id(),
        latency_ms = elapsed.as_millis() as u64,
        "order accepted"
    );

    (
        StatusCode::ACCEPTED,
        Json(OrderResponse {
            order_id: body.order_id,
            status: "CONFIRMED",
        }),
    )
        .into_response()
}

fn reject(
    state: &RelayState,
    start: Instant,
    response: axum::response::Response,
) -> axum::response::Response {
    state.metrics.record_rejection();
    state.metrics.record_latency(start.elapsed());
    response
}
