//! Shared error taxonomy.
//!
//! Every service maps its own failures onto this taxonomy so that retry
//! policy is decided by error *kind*, not by string matching:
//!
//! - `Validation` / `NotFound` are the caller's fault and are never retried.
//! - `Conflict` may be retried with *different* input, never the same.
//! - `TransientInfra` is safe to retry as-is because every mutating
//!   operation in the system is idempotent.
//! - `DownstreamUnavailable` is logged and metered, and never unwinds a
//!   commit that already happened.

use thiserror::Error;

/// Result type used across the domain layer.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (insufficient stock, duplicate under lock).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failed transiently (lock timeout, storage or broker
    /// unreachable). Safe to retry.
    #[error("transient infrastructure failure: {0}")]
    TransientInfra(String),

    /// A best-effort downstream hand-off failed after the primary effect
    /// was already committed.
    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientInfra(msg.into())
    }

    pub fn downstream(msg: impl Into<String>) -> Self {
        Self::DownstreamUnavailable(msg.into())
    }

    /// Whether a caller may safely retry the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientInfra(_))
    }
}
