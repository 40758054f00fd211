//! Inbound deployment webhook handler.
//!
//! Accepts signed CI completion events and drives them through the
//! deployment pipeline. The raw request body is passed to verification
//! untouched; axum's `Bytes` extractor guarantees no re-serialization
//! happens between the wire and the signature check.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tether_deploy::ReceiveError;
use tracing::{error, info, instrument, warn};

use crate::{handlers::error_response, server::AppState};

/// Header carrying the inbound payload signature.
pub const INBOUND_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Response for a processed deployment event.
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    /// Idempotency key of the deployment.
    pub key: String,
    /// Final lifecycle state.
    pub state: String,
    /// Version that was deployed, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Why the deploy or health check failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Error from a failed rollback, when one happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
}

/// Handles an inbound CI webhook delivery.
///
/// Status mapping: 401 for missing or invalid signatures, 400 for verified
/// payloads that fail to parse, 200 with the deployment record otherwise.
/// Redelivered events return the stored record with 200, same as a fresh
/// deploy.
#[instrument(name = "deploy_webhook", skip(state, headers, body), fields(body_len = body.len()))]
pub async fn deploy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(INBOUND_SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.receiver.receive(&body, signature).await {
        Ok(record) => {
            info!(key = record.key, state = %record.state, "deployment event processed");
            (
                StatusCode::OK,
                Json(DeployResponse {
                    key: record.key,
                    state: record.state.to_string(),
                    version: record.version,
                    failure_reason: record.failure_reason,
                    rollback_error: record.rollback_error,
                }),
            )
                .into_response()
        },
        Err(ReceiveError::Auth) => {
            warn!("rejected unauthenticated deployment webhook");
            error_response(StatusCode::UNAUTHORIZED, "invalid_signature", "signature verification failed")
        },
        Err(ReceiveError::Parse(message)) => {
            warn!(message, "rejected malformed deployment webhook");
            error_response(StatusCode::BAD_REQUEST, "invalid_payload", message)
        },
        Err(ReceiveError::Store(message)) => {
            error!(message, "record store failed while processing webhook");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", message)
        },
    }
}
