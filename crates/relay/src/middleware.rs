//! Bearer-token authentication middleware.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use mensa_core::StudentId;

use crate::app::RelayState;

/// Verified student identity, injected into request extensions.
#[derive(Debug, Clone)]
pub struct StudentContext {
    student_id: StudentId,
}

impl StudentContext {
    pub fn student_id(&self) -> &StudentId {
        &self.student_id
    }
}

pub async fn auth_middleware(
    State(state): State<RelayState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // Every request that reaches the gate counts as an attempt, including
    // ones rejected here.
    state.metrics.record_attempt();

    let token = match extract_bearer(req.headers()) {
        Ok(token) => token,
        Err(code) => {
            state.metrics.record_auth_failure();
            return Err(code);
        }
    };

    let claims = state.jwt.validate(token).map_err(|e| {
        state.metrics.record_auth_failure();
        tracing::warn!(error = %e, "token validation failed");
        StatusCode::UNAUTHORIZED
    })?;

    let student_id = claims.student().map_err(|_| {
        state.metrics.record_auth_failure();
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(StudentContext { student_id });

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();

    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
