//! Admission error taxonomy.
//!
//! Every rejection an upload request can hit is represented here. All
//! failures are terminal for the request that triggered them; nothing in
//! this subsystem retries internally.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// Missing, malformed or expired credential where one is required.
    #[error("missing or invalid credential")]
    Unauthenticated,

    /// The client is not allowed to upload at all.
    #[error("{0}")]
    Forbidden(String),

    /// The fixed rate window for this identifier is exhausted.
    #[error("rate limit exceeded, retry in {retry_after}s")]
    TooManyRequests { retry_after: u64 },

    /// No concurrency slot available for this identifier.
    #[error("{0}")]
    Busy(String),

    #[error("IP is already blacklisted")]
    AlreadyBlacklisted,

    #[error("entry not found")]
    NotFound,

    /// Empty or unusable IP address / key.
    #[error("invalid identifier")]
    InvalidIdentifier,

    /// Persistence failure in one of the backing stores.
    #[error("store error: {0}")]
    Store(#[from] std::io::Error),
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GateError::Forbidden(_) => StatusCode::FORBIDDEN,
            GateError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::Busy(_) => StatusCode::CONFLICT,
            GateError::AlreadyBlacklisted => StatusCode::CONFLICT,
            GateError::NotFound => StatusCode::NOT_FOUND,
            GateError::InvalidIdentifier => StatusCode::BAD_REQUEST,
            GateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let GateError::TooManyRequests { retry_after } = self {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(GateError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GateError::TooManyRequests { retry_after: 5 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GateError::Busy("busy".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(GateError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let response = GateError::TooManyRequests { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).map(|v| v.to_str().ok()),
            Some(Some("42"))
        );
    }
}
