//! Synchronous call to the stock ledger's deduction operation.
//!
//! The relay distinguishes exactly three failure shapes, each mapped to a
//! distinct client-visible error by the order handler: timeout, insufficient
//! stock, and everything else.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use mensa_core::{ItemId, OrderId, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductSuccess {
    pub transaction_id: TransactionId,
    pub remaining_stock: Option<u32>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeductError {
    /// The ledger did not respond within the bounded timeout. The call is
    /// abandoned; the ledger may still complete, which the idempotency key
    /// makes safe.
    #[error("stock ledger did not respond in time")]
    Timeout,

    /// The ledger rejected the deduction for insufficient stock.
    #[error("insufficient stock")]
    InsufficientStock,

    /// Any other non-success outcome.
    #[error("stock ledger unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DeductClient: Send + Sync {
    async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductSuccess, DeductError>;

    /// Best-effort reachability probe for the health endpoint.
    async fn ping(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct WireDeductResponse {
    transaction_id: TransactionId,
    remaining_stock: Option<u32>,
}

/// HTTP client against the ledger service.
#[derive(Clone)]
pub struct HttpDeductClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDeductClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DeductClient for HttpDeductClient {
    async fn deduct(
        &self,
        order_id: OrderId,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<DeductSuccess, DeductError> {
        let response = self
            .http
            .post(format!("{}/stock/deduct", self.base_url))
            .json(&json!({
                "order_id": order_id,
                "item_id": item_id,
                "quantity": quantity,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeductError::Timeout
                } else {
                    DeductError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            return Err(DeductError::InsufficientStock);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeductError::Unavailable(format!("{status}: {body}")));
        }

        let body: WireDeductResponse = response
            .json()
            .await
            .map_err(|e| DeductError::Unavailable(format!("malformed ledger response: {e}")))?;

        Ok(DeductSuccess {
            transaction_id: body.transaction_id,
            remaining_stock: body.remaining_stock,
        })
    }

    async fn ping(&self) -> bool {
        match self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(res) => !res.status().is_server_error(),
            Err(_) => false,
        }
    }
}
