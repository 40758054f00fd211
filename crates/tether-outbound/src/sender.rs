//! Retrying webhook sender.
//!
//! Drives the full delivery policy for one outbound webhook: circuit
//! breaker admission, signing, per-attempt timeouts, exponential backoff
//! between retries, and an optional overall deadline. The sender owns
//! policy; the transport underneath only executes attempts.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tether_core::{
    classify, signature, Clock, ErrorKind, TransportOutcome, WebhookError, WebhookOutcome,
    WebhookRequest,
};

use crate::{
    backoff::BackoffConfig,
    circuit::{Admission, CircuitBreaker},
    client::HttpTransport,
    envelope::DispatchEnvelope,
};

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-tether-signature";

/// Header carrying the per-send delivery id.
pub const DELIVERY_ID_HEADER: &str = "x-tether-delivery-id";

/// Header carrying the 1-based attempt number.
pub const ATTEMPT_HEADER: &str = "x-tether-attempt";

/// Delivery policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConfig {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the initial attempt. Total attempts is one more.
    pub max_retries: u32,
    /// Backoff schedule between retryable failures.
    pub backoff: BackoffConfig,
    /// Overall deadline across all attempts and waits, when set.
    pub deadline: Option<Duration>,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff: BackoffConfig::default(),
            deadline: None,
        }
    }
}

/// Outbound webhook sender with retries and circuit breaking.
///
/// The payload is signed once per send and the signature reused across
/// retries; each attempt still builds a fresh request so headers like the
/// attempt counter stay accurate.
#[derive(Debug)]
pub struct WebhookSender {
    transport: HttpTransport,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn Clock>,
    secret: Vec<u8>,
    config: SendConfig,
}

impl WebhookSender {
    /// Creates a sender.
    pub fn new(
        transport: HttpTransport,
        breaker: Arc<CircuitBreaker>,
        clock: Arc<dyn Clock>,
        secret: impl Into<Vec<u8>>,
        config: SendConfig,
    ) -> Self {
        Self { transport, breaker, clock, secret: secret.into(), config }
    }

    /// Serializes and sends a dispatch envelope to `destination`.
    pub async fn send_envelope(
        &self,
        destination: &str,
        envelope: &DispatchEnvelope,
        cancel: &CancellationToken,
    ) -> WebhookOutcome {
        let body = match envelope.to_bytes() {
            Ok(body) => body,
            Err(e) => {
                return WebhookOutcome::failure(
                    ErrorKind::Parse,
                    format!("failed to serialize dispatch envelope: {e}"),
                );
            },
        };

        self.send(destination, body, cancel).await
    }

    /// Sends a raw signed payload to `destination`.
    ///
    /// Returns [`WebhookOutcome::Success`] on the first 2xx response, or a
    /// failure carrying the classification of the final attempt. Retryable
    /// failures are retried up to `max_retries` times with backoff;
    /// non-retryable failures and circuit rejections return immediately.
    /// Only failures that reached the wire count against the circuit.
    pub async fn send(
        &self,
        destination: &str,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> WebhookOutcome {
        let delivery_id = Uuid::new_v4();
        let start = self.clock.now();
        let total_attempts = self.config.max_retries + 1;

        let signature = match signature::header_value(&self.secret, &body) {
            Ok(signature) => signature,
            Err(e) => {
                tracing::error!(destination, "cannot sign payload: {e}");
                return WebhookOutcome::failure(ErrorKind::Auth, format!("cannot sign payload: {e}"));
            },
        };

        let mut attempt: u32 = 1;
        loop {
            let admission = self.breaker.admit(destination).await;
            if admission == Admission::Rejected {
                tracing::warn!(
                    destination,
                    delivery_id = %delivery_id,
                    "delivery rejected by open circuit"
                );
                let error = WebhookError::circuit_open(destination);
                return WebhookOutcome::failure(error.kind, error.message);
            }
            let probing = admission == Admission::Probe;

            let request = self.build_request(destination, &body, &signature, delivery_id, attempt);

            let error = match self.transport.execute(&request).await {
                Ok(response) if response.is_success() => {
                    self.breaker.record_success(destination).await;
                    tracing::info!(
                        destination,
                        delivery_id = %delivery_id,
                        attempt,
                        status = response.status_code,
                        "webhook delivered"
                    );
                    return WebhookOutcome::Success {
                        status_code: response.status_code,
                        body: response.body,
                    };
                },
                Ok(response) => {
                    let kind = classify(&TransportOutcome::Status(response.status_code));
                    WebhookError::new(kind, format!("HTTP {} from destination", response.status_code))
                },
                Err(error) => error,
            };

            // Circuit accounting: only health signals count. Non-retryable
            // responses during a probe release it without reopening.
            if error.is_retryable() {
                self.breaker.record_failure(destination).await;
            } else if probing {
                self.breaker.release_probe(destination).await;
            }

            tracing::warn!(
                destination,
                delivery_id = %delivery_id,
                attempt,
                error = %error,
                "delivery attempt failed"
            );

            if !error.is_retryable() || attempt >= total_attempts {
                return WebhookOutcome::failure(error.kind, error.message);
            }

            let delay = self.config.backoff.delay_for_attempt(attempt);

            if let Some(deadline) = self.config.deadline {
                let elapsed = self.clock.now().saturating_duration_since(start);
                if elapsed + delay >= deadline {
                    tracing::warn!(
                        destination,
                        delivery_id = %delivery_id,
                        attempt,
                        "overall deadline reached, giving up"
                    );
                    return WebhookOutcome::failure(
                        error.kind,
                        format!("{} (deadline reached after {attempt} attempts)", error.message),
                    );
                }
            }

            tokio::select! {
                () = self.clock.sleep(delay) => {},
                () = cancel.cancelled() => {
                    tracing::info!(destination, delivery_id = %delivery_id, "send cancelled");
                    return WebhookOutcome::failure(
                        error.kind,
                        format!("{} (cancelled before retry)", error.message),
                    );
                },
            }

            attempt += 1;
        }
    }

    fn build_request(
        &self,
        destination: &str,
        body: &Bytes,
        signature: &str,
        delivery_id: Uuid,
        attempt: u32,
    ) -> WebhookRequest {
        WebhookRequest {
            url: destination.to_string(),
            method: "POST".to_string(),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                (SIGNATURE_HEADER.to_string(), signature.to_string()),
                (DELIVERY_ID_HEADER.to_string(), delivery_id.to_string()),
                (ATTEMPT_HEADER.to_string(), attempt.to_string()),
            ],
            body: body.clone(),
            timeout: self.config.timeout,
        }
    }
}
