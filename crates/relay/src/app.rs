//! Router wiring for the relay gateway.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio_util::task::TaskTracker;

use mensa_auth::JwtValidator;

use crate::cache::StockCache;
use crate::ledger_client::DeductClient;
use crate::metrics::RelayMetrics;
use crate::middleware;
use crate::order;
use crate::publisher::OrderEventPublisher;

/// Shared per-process state. Nothing here is request-scoped; the only
/// mutable pieces are the lock-free metrics counters.
#[derive(Clone)]
pub struct RelayState {
    pub jwt: Arc<dyn JwtValidator>,
    pub cache: Arc<dyn StockCache>,
    pub ledger: Arc<dyn DeductClient>,
    pub publisher: Arc<dyn OrderEventPublisher>,
    pub metrics: Arc<RelayMetrics>,
    /// Tracks detached publish tasks so shutdown can drain them.
    pub tracker: TaskTracker,
    pub cache_ttl: Duration,
}

/// Build the full HTTP router (used by `main.rs` and the black-box tests).
pub fn build_app(state: RelayState) -> Router {
    let protected = Router::new()
        .route("/order", post(order::place_order))
        .layer(Extension(state.clone()))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(Extension(state))
        .merge(protected)
}

async fn health(Extension(state): Extension<RelayState>) -> axum::response::Response {
    let cache = state.cache.ping().await;
    let ledger = state.ledger.ping().await;

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "mensa-relay",
            "cache": cache,
            "ledger": ledger,
        })),
    )
        .into_response()
}

async fn metrics(Extension(state): Extension<RelayState>) -> axum::response::Response {
    (StatusCode::OK, Json(state.metrics.snapshot())).into_response()
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
