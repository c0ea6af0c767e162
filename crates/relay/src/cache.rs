//! TTL'd stock cache consumed by the relay.
//!
//! The cache must never block an order: any backend failure is treated as
//! a miss on read and swallowed on write ("fail open"). The only value
//! with routing power is an exact `0`, which short-circuits the ledger
//! call for the TTL window.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use mensa_core::ItemId;

#[async_trait]
pub trait StockCache: Send + Sync {
    /// Cached stock level, or `None` for a miss *or* a backend failure.
    async fn get(&self, item_id: ItemId) -> Option<u32>;

    /// Best-effort write with TTL; failures are logged, never raised.
    async fn set(&self, item_id: ItemId, quantity: u32, ttl: Duration);

    /// Backend reachability for the health endpoint.
    async fn ping(&self) -> bool;
}

const KEY_PREFIX: &str = "stock:";

fn cache_key(item_id: ItemId) -> String {
    format!("{KEY_PREFIX}{item_id}")
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisStockCache {
    client: redis::Client,
}

impl RedisStockCache {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }
}

#[async_trait]
impl StockCache for RedisStockCache {
    async fn get(&self, item_id: ItemId) -> Option<u32> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        match conn.get::<_, Option<u32>>(cache_key(item_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn set(&self, item_id: ItemId, quantity: u32, ttl: Duration) {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "cache write failed; skipping");
                return;
            }
        };

        if let Err(e) = conn
            .set_ex::<_, _, ()>(cache_key(item_id), quantity, ttl.as_secs())
            .await
        {
            warn!(item_id = %item_id, error = %e, "cache write failed; skipping");
        }
    }

    async fn ping(&self) -> bool {
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// In-memory cache with real TTL expiry. Tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockCache {
    entries: Mutex<HashMap<ItemId, (u32, Instant)>>,
}

impl InMemoryStockCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockCache for InMemoryStockCache {
    async fn get(&self, item_id: ItemId) -> Option<u32> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(&item_id) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(*value),
            Some(_) => {
                entries.remove(&item_id);
                None
            }
            None => None,
        }
    }

    async fn set(&self, item_id: ItemId, quantity: u32, ttl: Duration) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(item_id, (quantity, Instant::now() + ttl));
    }

    async fn ping(&self) -> bool {
        true
    }
}
