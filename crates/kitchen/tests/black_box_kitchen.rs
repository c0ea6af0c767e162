use std::sync::Arc;

use reqwest::StatusCode;

use mensa_core::{ItemId, OrderId, StudentId};
use mensa_events::KitchenStatus;
use mensa_kitchen::domain::NewKitchenOrder;
use mensa_kitchen::{InMemoryKitchenStore, KitchenMetrics, KitchenState, KitchenStore, build_app};

struct TestServer {
    base_url: String,
    store: Arc<InMemoryKitchenStore>,
    metrics: Arc<KitchenMetrics>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryKitchenStore::new());
        let metrics = Arc::new(KitchenMetrics::new());
        let app = build_app(KitchenState {
            store: store.clone(),
            metrics: metrics.clone(),
        });

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
            store,
            metrics,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn order_lookup_returns_the_row_and_its_history() {
    let srv = TestServer::spawn().await;
    let order_id = OrderId::new();

    srv.store
        .admit(NewKitchenOrder {
            order_id,
            student_id: StudentId::new("s-9"),
            item_id: ItemId::new(),
            quantity: 3,
        })
        .await
        .unwrap();
    srv.store
        .transition(order_id, KitchenStatus::InProgress)
        .await
        .unwrap();
    srv.store
        .transition(order_id, KitchenStatus::Ready)
        .await
        .unwrap();

    let res = reqwest::Client::new()
        .get(format!("{}/orders/{}", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "READY");
    assert_eq!(body["quantity"], 3);
    assert!(body["started_at"].is_string());
    assert!(body["completed_at"].is_string());

    let history = body["status_history"].as_array().unwrap();
    let statuses: Vec<&str> = history
        .iter()
        .map(|e| e["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["RECEIVED", "IN_PROGRESS", "READY"]);
}

#[tokio::test]
async fn unknown_order_is_404() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/orders/{}", srv.base_url, OrderId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "order_not_found");
}

#[tokio::test]
async fn health_reflects_queue_connectivity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Queue not connected yet.
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["database"], true);
    assert_eq!(body["queue"], false);

    srv.metrics.set_queue_connected(true);
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_snapshot_is_exposed_as_json() {
    let srv = TestServer::spawn().await;
    srv.metrics.record_received();
    srv.metrics.record_duplicate();

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/metrics", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["total_orders_received"], 1);
    assert_eq!(body["duplicates"], 1);
    assert_eq!(body["total_orders_processed"], 0);
    assert_eq!(body["average_processing_time_ms"], 0.0);
}
