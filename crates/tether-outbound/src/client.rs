//! HTTP transport for outbound webhook attempts.
//!
//! Executes a single prepared request and maps transport failures onto the
//! shared error taxonomy. Status handling and retry policy live in the
//! sender; this layer only moves bytes and reports what happened.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info_span, Instrument};

use tether_core::{WebhookError, WebhookRequest};

/// Response bodies are truncated to this size before being surfaced.
const MAX_BODY_SIZE: usize = 1024;

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent sent with every request.
    pub user_agent: String,
    /// Maximum redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { user_agent: "Tether-Webhook/1.0".to_string(), max_redirects: 3 }
    }
}

/// The underlying HTTP client could not be constructed.
#[derive(Debug, Error)]
#[error("failed to build HTTP transport: {0}")]
pub struct TransportBuildError(#[from] reqwest::Error);

/// Result of one attempt that produced an HTTP response.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated to [`MAX_BODY_SIZE`].
    pub body: String,
    /// Wall-clock duration of the attempt.
    pub duration: Duration,
}

impl DeliveryResponse {
    /// Whether the status is 2xx.
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}

/// HTTP transport with connection pooling.
///
/// Per-attempt timeouts come from the request, not the client, so the same
/// transport serves senders with different deadlines.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport with the given configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportBuildError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()?;

        Ok(Self { client })
    }

    /// Builds a transport with default configuration.
    pub fn with_defaults() -> Result<Self, TransportBuildError> {
        Self::new(&ClientConfig::default())
    }

    /// Executes one delivery attempt.
    ///
    /// Returns `Ok` for any HTTP response regardless of status; the caller
    /// classifies non-2xx statuses. Errors are transport-level only: elapsed
    /// per-attempt timeouts map to timeout errors, connection failures and
    /// everything else to network errors.
    pub async fn execute(&self, request: &WebhookRequest) -> Result<DeliveryResponse, WebhookError> {
        let start = std::time::Instant::now();

        let span = info_span!("webhook_attempt", url = %request.url, method = %request.method);

        async move {
            let mut http_request = self
                .client
                .request(
                    request.method.parse().unwrap_or(reqwest::Method::POST),
                    &request.url,
                )
                .timeout(request.timeout)
                .body(request.body.clone());

            for (name, value) in &request.headers {
                http_request = http_request.header(name, value);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "attempt failed: {e}");

                    if e.is_timeout() {
                        return Err(WebhookError::timeout(format!(
                            "no response within {:?}",
                            request.timeout
                        )));
                    }
                    if e.is_connect() {
                        return Err(WebhookError::network(format!("connection failed: {e}")));
                    }
                    return Err(WebhookError::network(e.to_string()));
                },
            };

            let status_code = response.status().as_u16();
            let body = read_body(response).await;
            let duration = start.elapsed();

            tracing::debug!(status = status_code, duration_ms = duration.as_millis(), "response received");

            Ok(DeliveryResponse { status_code, body, duration })
        }
        .instrument(span)
        .await
    }
}

/// Reads and truncates a response body.
async fn read_body(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_BODY_SIZE => {
            let suffix = "... (truncated)";
            let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_SIZE - suffix.len()]);
            format!("{truncated}{suffix}")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read response body: {e}");
            format!("[failed to read response body: {e}]")
        },
    }
}
