//! Dispatch payload sent to the automation destination.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload for an outbound dispatch.
///
/// Serialized exactly once per send; the resulting bytes are signed and
/// reused verbatim on every retry so the signature stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEnvelope {
    /// Message text to dispatch.
    pub message: String,
    /// User the message originates from.
    pub user_id: String,
    /// When the dispatch was requested.
    pub timestamp: DateTime<Utc>,
    /// Automation tool to invoke, when the caller picked one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl DispatchEnvelope {
    /// Serializes the envelope to the bytes that get signed and sent.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}
