//! Environment-driven configuration.

use std::time::Duration;

/// Runtime configuration for the relay gateway.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub jwt_secret: String,
    pub redis_url: String,
    pub ledger_base_url: String,
    /// Bound on the synchronous ledger call.
    pub ledger_timeout: Duration,
    /// Staleness window of the stock cache.
    pub cache_ttl: Duration,
    pub order_stream_key: String,
}

impl RelayConfig {
    /// Read configuration from the environment, logging dev defaults.
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            "dev-secret".to_string()
        });

        Self {
            listen_addr: std::env::var("RELAY_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            jwt_secret,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ledger_base_url: std::env::var("LEDGER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            ledger_timeout: Duration::from_millis(env_u64("GATEWAY_TIMEOUT_MS", 2_000)),
            cache_ttl: Duration::from_secs(env_u64("CACHE_TTL_SECS", 60)),
            order_stream_key: std::env::var("ORDER_STREAM_KEY")
                .unwrap_or_else(|_| "mensa:orders".to_string()),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
