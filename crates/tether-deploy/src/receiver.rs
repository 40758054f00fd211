//! Inbound webhook receiver.
//!
//! Front door for CI completion events: verifies the payload signature
//! against the exact raw bytes, parses the event, and hands it to the
//! deployment pipeline. Verification comes first so unauthenticated
//! payloads are never parsed.

use std::sync::Arc;

use thiserror::Error;

use tether_core::{signature, DeploymentRecord};

use crate::{event, pipeline::DeploymentPipeline};

/// Why an inbound delivery was not processed.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// Signature missing or does not match the payload.
    #[error("signature verification failed")]
    Auth,

    /// Payload verified but could not be parsed into an event.
    #[error("malformed event payload: {0}")]
    Parse(String),

    /// The record store failed while processing.
    #[error("record store failure: {0}")]
    Store(String),
}

/// Receives and processes signed CI webhooks.
#[derive(Debug)]
pub struct WebhookReceiver {
    secret: Vec<u8>,
    pipeline: Arc<DeploymentPipeline>,
}

impl WebhookReceiver {
    /// Creates a receiver verifying with `secret` and deploying through
    /// `pipeline`.
    pub fn new(secret: impl Into<Vec<u8>>, pipeline: Arc<DeploymentPipeline>) -> Self {
        Self { secret: secret.into(), pipeline }
    }

    /// Handles one inbound delivery.
    ///
    /// `signature_header` is the value of the signature header as received,
    /// or `None` when the header was absent. Ordering is strict: signature
    /// first, then parse, then pipeline. The raw body bytes are verified
    /// exactly as transmitted.
    pub async fn receive(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<DeploymentRecord, ReceiveError> {
        let Some(provided) = signature_header else {
            tracing::warn!("inbound delivery without signature header");
            return Err(ReceiveError::Auth);
        };

        if !signature::verify(&self.secret, raw_body, provided) {
            tracing::warn!("inbound delivery failed signature verification");
            return Err(ReceiveError::Auth);
        }

        let event = event::parse_event(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "verified delivery failed to parse");
            ReceiveError::Parse(e.to_string())
        })?;

        tracing::info!(
            event = "WEBHOOK_RECEIVED",
            key = event.idempotency_key(),
            repository = event.repository,
            workflow = event.workflow,
            "received deployment event"
        );

        self.pipeline.process(event).await.map_err(|e| ReceiveError::Store(e.to_string()))
    }
}
