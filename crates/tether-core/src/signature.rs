//! HMAC-SHA256 signature codec for webhook payloads.
//!
//! Signatures are computed over the exact raw byte payload, never a
//! re-serialized form, so whitespace or key-ordering drift between sender
//! and receiver cannot break verification. Verification compares in
//! constant time and returns `false` for malformed input instead of
//! erroring.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix used by the wire format (`sha256=<hex>`).
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Signature computation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signing key was rejected by the MAC implementation.
    #[error("invalid signing key")]
    InvalidKey,
}

/// Computes the hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Computes the full signature header value, `sha256=<hex>`.
pub fn header_value(secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
    Ok(format!("{SIGNATURE_PREFIX}{}", sign(secret, payload)?))
}

/// Verifies a provided signature against the expected MAC of `payload`.
///
/// Accepts the `sha256=<hex>` header format or a bare 64-character hex
/// string. Returns `false` on any mismatch or malformed input; this function
/// never panics and never errors.
pub fn verify(secret: &[u8], payload: &[u8], provided: &str) -> bool {
    let Some(provided_hex) = strip_format(provided) else {
        return false;
    };

    let Ok(expected_hex) = sign(secret, payload) else {
        return false;
    };

    constant_time_eq(provided_hex.as_bytes(), expected_hex.as_bytes())
}

/// Extracts the hex digest from a signature header value.
///
/// Supported formats: `sha256=<hex>` and bare 64-char hex.
fn strip_format(provided: &str) -> Option<&str> {
    if let Some(hex_part) = provided.strip_prefix(SIGNATURE_PREFIX) {
        return Some(hex_part);
    }

    if provided.len() == 64 && provided.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(provided);
    }

    None
}

/// Constant-time byte comparison.
///
/// Folds XOR over the full length so the comparison never short-circuits on
/// the first differing byte. Length mismatch returns early; length is not a
/// secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
