//! Outbound webhook delivery.
//!
//! Sends signed payloads to the automation destination with retries,
//! exponential backoff, per-attempt timeouts, and a per-destination circuit
//! breaker. The public entry point is [`WebhookSender`]; the other modules
//! are the policy pieces it composes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod circuit;
pub mod client;
pub mod envelope;
pub mod sender;

pub use backoff::BackoffConfig;
pub use circuit::{Admission, CircuitBreaker, CircuitConfig, CircuitState, CircuitStats};
pub use client::{ClientConfig, DeliveryResponse, HttpTransport, TransportBuildError};
pub use envelope::DispatchEnvelope;
pub use sender::{SendConfig, WebhookSender, SIGNATURE_HEADER};
