//! Outbound dispatch handler.
//!
//! Accepts a dispatch request, wraps it in a signed envelope, and delivers
//! it to the configured automation destination through the retrying sender.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tether_core::{ErrorKind, WebhookOutcome};
use tether_outbound::DispatchEnvelope;
use tracing::{info, instrument, warn};

use crate::server::AppState;

/// Request body for an outbound dispatch.
#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    /// Message text to dispatch.
    pub message: String,
    /// User the message originates from.
    pub user_id: String,
    /// Automation tool to invoke, when the caller picked one.
    #[serde(default)]
    pub tool: Option<String>,
}

/// Handles an outbound dispatch request.
///
/// Status mapping: 202 when the destination acknowledged the payload, 503
/// when the circuit breaker rejected the send without attempting it, 502
/// for every other delivery failure. The response body is the delivery
/// outcome in both cases.
#[instrument(name = "dispatch_webhook", skip(state, request), fields(user_id = %request.user_id))]
pub async fn dispatch_webhook(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Response {
    let envelope = DispatchEnvelope {
        message: request.message,
        user_id: request.user_id,
        timestamp: DateTime::<Utc>::from(state.clock.now_system()),
        tool: request.tool,
    };

    let outcome =
        state.sender.send_envelope(&state.automation_url, &envelope, &state.shutdown).await;

    let status = match &outcome {
        WebhookOutcome::Success { status_code, .. } => {
            info!(status = status_code, "dispatch delivered");
            StatusCode::ACCEPTED
        },
        WebhookOutcome::Failure { kind: ErrorKind::CircuitOpen, .. } => {
            warn!("dispatch rejected, automation circuit open");
            StatusCode::SERVICE_UNAVAILABLE
        },
        WebhookOutcome::Failure { kind, message, .. } => {
            warn!(kind = %kind, message, "dispatch failed");
            StatusCode::BAD_GATEWAY
        },
    };

    (status, Json(outcome)).into_response()
}
