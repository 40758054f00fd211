//! Error taxonomy for webhook operations.
//!
//! Defines the closed set of failure kinds shared by the outbound client and
//! the inbound receiver, together with the retryability policy that drives
//! retry loops and circuit breaker accounting.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of webhook failure kinds.
///
/// Every transport or protocol failure maps to exactly one kind; there is no
/// "unknown" escape hatch. `CircuitOpen` is synthetic: it is produced by the
/// circuit breaker without touching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection-level failure: refused, reset, or DNS resolution error.
    Network,

    /// Per-attempt deadline exceeded.
    Timeout,

    /// HTTP 401/403 or a signature mismatch.
    Auth,

    /// Any other 4xx response.
    Client,

    /// 5xx response from the destination.
    Server,

    /// Body failed schema parse.
    Parse,

    /// Rejected by an open circuit breaker; the call was never attempted.
    CircuitOpen,
}

impl ErrorKind {
    /// Whether failures of this kind should be retried.
    ///
    /// Only transient transport conditions qualify. Auth, client, and parse
    /// failures will not improve on retry, and `CircuitOpen` must surface
    /// immediately so callers can back off.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Server)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network_error"),
            Self::Timeout => write!(f, "timeout_error"),
            Self::Auth => write!(f, "auth_error"),
            Self::Client => write!(f, "client_error"),
            Self::Server => write!(f, "server_error"),
            Self::Parse => write!(f, "parse_error"),
            Self::CircuitOpen => write!(f, "circuit_open"),
        }
    }
}

/// A classified webhook failure with human-readable context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct WebhookError {
    /// Which kind of failure occurred.
    pub kind: ErrorKind,
    /// Context for logs and the final outcome surfaced to callers.
    pub message: String,
}

impl WebhookError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Connection-level failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Per-attempt deadline exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Authentication or signature failure.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    /// Non-auth 4xx response.
    pub fn client(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Client, message)
    }

    /// 5xx response.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    /// Malformed body.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    /// Synthetic circuit breaker rejection.
    pub fn circuit_open(destination: impl fmt::Display) -> Self {
        Self::new(ErrorKind::CircuitOpen, format!("circuit open for {destination}"))
    }

    /// Whether this failure should be retried.
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
