//! Transport-outcome classification.
//!
//! Maps every observable result of a delivery attempt onto the closed
//! [`ErrorKind`] taxonomy. The mapping is pure and total: there is exactly
//! one kind for every input and no fallthrough to "unknown".

use crate::error::ErrorKind;

/// Observable result of a single delivery attempt, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// Connection could not be established (refused, reset, DNS failure).
    ConnectionFailed {
        /// Transport-level detail for logging.
        detail: String,
    },

    /// The per-attempt deadline elapsed before a response arrived.
    TimedOut,

    /// The destination rejected the payload signature.
    SignatureMismatch,

    /// A response arrived with this HTTP status.
    Status(u16),

    /// A response arrived but its body failed schema parse.
    MalformedBody,
}

/// Classifies a transport outcome into exactly one [`ErrorKind`].
///
/// Rules in priority order: connection failures are network errors, elapsed
/// deadlines are timeouts, 401/403 and signature mismatches are auth errors,
/// remaining 4xx are client errors, 5xx are server errors, and unparseable
/// bodies are parse errors. Statuses outside 4xx/5xx that reach this point
/// (stray 1xx/3xx after redirect limits) are treated as client errors since
/// retrying cannot fix them.
pub fn classify(outcome: &TransportOutcome) -> ErrorKind {
    match outcome {
        TransportOutcome::ConnectionFailed { .. } => ErrorKind::Network,
        TransportOutcome::TimedOut => ErrorKind::Timeout,
        TransportOutcome::SignatureMismatch => ErrorKind::Auth,
        TransportOutcome::Status(401 | 403) => ErrorKind::Auth,
        TransportOutcome::Status(500..=599) => ErrorKind::Server,
        TransportOutcome::Status(_) => ErrorKind::Client,
        TransportOutcome::MalformedBody => ErrorKind::Parse,
    }
}
