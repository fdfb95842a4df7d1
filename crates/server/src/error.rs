//! Errors returned by route handlers.
//!
//! Server-side failures are reported to Sentry and logged; clients only see
//! a short generic message for them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application-level error type for the read endpoint.
#[derive(Debug, Error)]
pub enum AppError {
    /// No such order, or the store could not be asked.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Response body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Status code and client-facing body.
    ///
    /// Server-side failures get a fixed body; their detail stays in the logs.
    fn status_and_body(&self) -> (StatusCode, String) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_owned(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Failed to encode response");
        }

        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = AppError::NotFound("order A1".to_string());
        assert_eq!(err.to_string(), "Not found: order A1");

        let err = AppError::BadRequest("missing order uid".to_string());
        assert_eq!(err.to_string(), "Bad request: missing order uid");
    }

    #[test]
    fn test_status_mapping() {
        let (status, _) = AppError::NotFound("order A1".to_owned()).status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = AppError::BadRequest("no uid".to_owned()).status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad request: no uid");
    }

    #[test]
    fn test_serialization_error_hides_detail() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = AppError::Serialization(serde_err);

        let (status, body) = err.status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Internal server error");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
