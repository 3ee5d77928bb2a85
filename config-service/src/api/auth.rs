//! Bearer token check applied to every directory route

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use super::ApiError;
use crate::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Outcome of checking an `Authorization` header against the expected token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Accepted,
    /// No header, or not a bearer header
    Missing,
    /// Bearer header with the wrong token
    Rejected,
}

/// Compare the presented bearer token in constant time
pub fn check_bearer(header: Option<&str>, expected: &str) -> TokenCheck {
    let Some(presented) = header.and_then(|h| h.strip_prefix(BEARER_PREFIX)) else {
        return TokenCheck::Missing;
    };

    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        TokenCheck::Accepted
    } else {
        TokenCheck::Rejected
    }
}

/// Middleware refusing requests without the configured bearer token
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.auth.token.as_deref() else {
        error!("Rejecting request: no authentication token is configured");
        return Err(ApiError::Internal("authentication token is not configured".into()));
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match check_bearer(header, expected) {
        TokenCheck::Accepted => Ok(next.run(request).await),
        TokenCheck::Missing => Err(ApiError::Unauthorized(
            "Missing or invalid Authorization header".into(),
        )),
        TokenCheck::Rejected => {
            warn!(path = %request.uri().path(), "Rejected request with wrong bearer token");
            Err(ApiError::Forbidden("Invalid authentication token".into()))
        }
    }
}
