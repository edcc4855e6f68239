//! API error type for the mock server
//!
//! Every failure uses the `{"status":"error","message":...}` envelope.
//! Application-level rejections are delivered with HTTP 200 so clients read
//! the envelope rather than the status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nfc_common::api::Ack;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request refused by the session rules (200)
    #[error("{0}")]
    Rejected(String),

    /// Unknown route (404)
    #[error("Route not found")]
    NotFound,

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),
}

impl From<&str> for ApiError {
    fn from(message: &str) -> Self {
        ApiError::Rejected(message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Rejected(_) => StatusCode::OK,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(Ack::error(self.to_string()))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from("Recording already in progress").into_response().status(),
            StatusCode::OK
        );
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Internal("lock poisoned".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
