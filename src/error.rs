// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while serving a delay or forwarding a request
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or negative delay amount
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Wait aborted by shutdown before it completed
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// Gateway could not reach the backend at all
    #[error("Downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", msg)
            }
            ApiError::Interrupted(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "interrupted", msg)
            }
            ApiError::DownstreamUnavailable(msg) => {
                (StatusCode::BAD_GATEWAY, "downstream_unavailable", msg)
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for request handling
pub type Result<T> = std::result::Result<T, ApiError>;
