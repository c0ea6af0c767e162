use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;
use tokio_util::task::TaskTracker;

use mensa_auth::{Hs256JwtValidator, OrderClaims};
use mensa_core::{ItemId, OrderId, TransactionId};
use mensa_events::{EventEnvelope, OrderPlaced};
use mensa_relay::cache::{InMemoryStockCache, StockCache};
use mensa_relay::ledger_client::{DeductClient, DeductError, DeductSuccess};
use mensa_relay::publisher::{OrderEventPublisher, PublishError};
use mensa_relay::{RelayMetrics, RelayState, build_app};

const JWT_SECRET: &str = "test-secret";

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

struct StubLedger {
    calls: AtomicUsize,
    result: Result<DeductSuccess, DeductError>,
}

impl StubLedger {
    fn always(result: Result<DeductSuccess, DeductError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            result,
        })
    }

    fn success(remaining: u32) -> Arc<Self> {
        Self::always(Ok(DeductSuccess {
            transaction_id: TransactionId::new(),
            remaining_stock: Some(remaining),
        }))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeductClient for StubLedger {
    async fn deduct(
        &self,
        _order_id: OrderId,
        _item_id: ItemId,
        _quantity: u32,
    ) -> Result<DeductSuccess, DeductError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: std::sync::Mutex<Vec<EventEnvelope<OrderPlaced>>>,
    fail: bool,
}

impl RecordingPublisher {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            events: std::sync::Mutex::new(Vec::new()),
            fail: true,
        })
    }

    fn events(&self) -> Vec<EventEnvelope<OrderPlaced>> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderEventPublisher for RecordingPublisher {
    async fn publish(&self, event: EventEnvelope<OrderPlaced>) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Connection("stub broker down".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Cache whose backend is permanently down; every call behaves as a miss.
struct BrokenCache;

#[async_trait]
impl StockCache for BrokenCache {
    async fn get(&self, _item_id: ItemId) -> Option<u32> {
        None
    }

    async fn set(&self, _item_id: ItemId, _quantity: u32, _ttl: Duration) {}

    async fn ping(&self) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

struct TestServer {
    base_url: String,
    state: RelayState,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(
        cache: Arc<dyn StockCache>,
        ledger: Arc<dyn DeductClient>,
        publisher: Arc<dyn OrderEventPublisher>,
        cache_ttl: Duration,
    ) -> Self {
        let state = RelayState {
            jwt: Arc::new(Hs256JwtValidator::new(JWT_SECRET)),
            cache,
            ledger,
            publisher,
            metrics: Arc::new(RelayMetrics::new()),
            tracker: TaskTracker::new(),
            cache_ttl,
        };

        let app = build_app(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    async fn drain_publishes(&self) {
        self.state.tracker.close();
        self.state.tracker.wait().await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(student_id: &str) -> String {
    let now = Utc::now();
    let claims = OrderClaims {
        student_id: Some(student_id.to_string()),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn order_body(item_id: ItemId) -> serde_json::Value {
    json!({"order_id": OrderId::new(), "item_id": item_id, "quantity": 2})
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn order_requires_a_valid_token() {
    let ledger = StubLedger::success(5);
    let srv = TestServer::spawn(
        Arc::new(InMemoryStockCache::new()),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/order", srv.base_url))
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("{}/order", srv.base_url))
        .bearer_auth("garbage")
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(ledger.calls(), 0);
    assert_eq!(srv.state.metrics.snapshot().auth_failures, 2);
}

#[tokio::test]
async fn successful_order_deducts_caches_and_publishes() {
    let cache = Arc::new(InMemoryStockCache::new());
    let ledger = StubLedger::success(7);
    let publisher = RecordingPublisher::new();
    let srv = TestServer::spawn(
        cache.clone(),
        ledger.clone(),
        publisher.clone(),
        Duration::from_secs(60),
    )
    .await;

    let item_id = ItemId::new();
    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-42"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "CONFIRMED");

    assert_eq!(ledger.calls(), 1);
    assert_eq!(cache.get(item_id).await, Some(7));

    srv.drain_publishes().await;
    let events = publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload().student_id.as_str(), "s-42");
    assert_eq!(events[0].payload().quantity, 2);

    let snapshot = srv.state.metrics.snapshot();
    assert_eq!(snapshot.successful, 1);
    assert_eq!(snapshot.rejected, 0);
}

#[tokio::test]
async fn cached_zero_short_circuits_without_a_ledger_call() {
    let cache = Arc::new(InMemoryStockCache::new());
    let ledger = StubLedger::success(5);
    let srv = TestServer::spawn(
        cache.clone(),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let item_id = ItemId::new();
    cache.set(item_id, 0, Duration::from_secs(60)).await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(ledger.calls(), 0);
    let snapshot = srv.state.metrics.snapshot();
    assert_eq!(snapshot.cache_short_circuits, 1);
    assert_eq!(snapshot.rejected, 1);
}

#[tokio::test]
async fn nonzero_cache_value_still_consults_the_ledger() {
    let cache = Arc::new(InMemoryStockCache::new());
    let ledger = StubLedger::success(3);
    let srv = TestServer::spawn(
        cache.clone(),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let item_id = ItemId::new();
    cache.set(item_id, 4, Duration::from_secs(60)).await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn cache_outage_fails_open() {
    let ledger = StubLedger::success(5);
    let srv = TestServer::spawn(
        Arc::new(BrokenCache),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn conflict_poisons_the_cache_so_the_next_request_short_circuits() {
    let cache = Arc::new(InMemoryStockCache::new());
    let ledger = StubLedger::always(Err(DeductError::InsufficientStock));
    let srv = TestServer::spawn(
        cache.clone(),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;
    let client = reqwest::Client::new();

    let item_id = ItemId::new();
    let res = client
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(ledger.calls(), 1);
    assert_eq!(cache.get(item_id).await, Some(0));

    // Within the TTL the relay rejects without consulting the ledger.
    let res = client
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(ledger.calls(), 1);
    let snapshot = srv.state.metrics.snapshot();
    assert_eq!(snapshot.cache_short_circuits, 1);
    assert_eq!(snapshot.rejected, 2);
    // Exhaustion is a business rejection, not a ledger fault.
    assert_eq!(snapshot.downstream_failures, 0);
}

#[tokio::test]
async fn cache_ttl_expiry_reopens_the_ledger_path() {
    let cache = Arc::new(InMemoryStockCache::new());
    let ledger = StubLedger::success(9);
    let srv = TestServer::spawn(
        cache.clone(),
        ledger.clone(),
        RecordingPublisher::new(),
        Duration::from_millis(50),
    )
    .await;

    let item_id = ItemId::new();
    cache.set(item_id, 0, Duration::from_millis(50)).await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(item_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(ledger.calls(), 1);
}

#[tokio::test]
async fn ledger_timeout_maps_to_gateway_timeout() {
    let ledger = StubLedger::always(Err(DeductError::Timeout));
    let srv = TestServer::spawn(
        Arc::new(InMemoryStockCache::new()),
        ledger,
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let snapshot = srv.state.metrics.snapshot();
    assert_eq!(snapshot.downstream_failures, 1);
    assert_eq!(snapshot.rejected, 1);
}

#[tokio::test]
async fn other_ledger_failures_map_to_bad_gateway() {
    let ledger = StubLedger::always(Err(DeductError::Unavailable("boom".to_string())));
    let srv = TestServer::spawn(
        Arc::new(InMemoryStockCache::new()),
        ledger,
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn publish_failure_never_fails_the_order() {
    let publisher = RecordingPublisher::failing();
    let srv = TestServer::spawn(
        Arc::new(InMemoryStockCache::new()),
        StubLedger::success(5),
        publisher,
        Duration::from_secs(60),
    )
    .await;

    let res = reqwest::Client::new()
        .post(format!("{}/order", srv.base_url))
        .bearer_auth(mint_jwt("s-1"))
        .json(&order_body(ItemId::new()))
        .send()
        .await
        .unwrap();

    // The deduction is already committed; the hand-off is best effort.
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    srv.drain_publishes().await;
    assert_eq!(srv.state.metrics.snapshot().downstream_failures, 1);
    assert_eq!(srv.state.metrics.snapshot().successful, 1);
}

#[tokio::test]
async fn health_reports_dependency_reachability() {
    let srv = TestServer::spawn(
        Arc::new(BrokenCache),
        StubLedger::success(5),
        RecordingPublisher::new(),
        Duration::from_secs(60),
    )
    .await;

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"], false);
    assert_eq!(body["ledger"], true);
}
