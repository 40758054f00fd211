//! HTTP request handlers.

pub mod deploy;
pub mod dispatch;
pub mod health;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub use deploy::deploy_webhook;
pub use dispatch::dispatch_webhook;
pub use health::{health_check, liveness_check, readiness_check};

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including code and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

/// Builds a JSON error response.
pub(crate) fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail { code: code.to_string(), message: message.into() },
        }),
    )
        .into_response()
}
