//! JWT claims model (transport-agnostic).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mensa_core::StudentId;

/// The claims the order relay expects once a token has been decoded and
/// its signature verified.
///
/// `student_id` identifies the ordering student; `exp` is mandatory and
/// enforced during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClaims {
    /// Ordering student. Required; a token without it is rejected.
    pub student_id: Option<String>,

    /// Issued-at, seconds since the epoch.
    #[serde(default)]
    pub iat: i64,

    /// Expiration, seconds since the epoch.
    pub exp: i64,
}

impl OrderClaims {
    /// The verified student identity, or the missing-claim error the
    /// relay maps to 401.
    pub fn student(&self) -> Result<StudentId, TokenError> {
        self.student_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(StudentId::new)
            .ok_or(TokenError::MissingClaim("student_id"))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("token missing required claim: {0}")]
    MissingClaim(&'static str),
}
