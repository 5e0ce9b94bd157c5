//! Webhook signature verification: HMAC-SHA256 over the raw body, rendered as lowercase hex.
//!
//! A request without any signature header is processed anyway (fail-open); the webhook response
//! reports that validation was skipped. Comparison is plain string equality.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Substring matched (case-insensitively) against header names to find the signature.
pub const SIGNATURE_HEADER_MARKER: &str = "line-signature";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("channel secret is not configured")]
    MissingSecret,
    /// Required by the `Mac` key API; HMAC accepts keys of any length, so this does not occur.
    #[error("invalid hmac key: {0}")]
    InvalidKey(String),
}

/// Result of checking a request's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid,
    /// No signature header; caller proceeds without validation.
    Absent,
}

/// Lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(body: &[u8], secret: Option<&str>) -> Result<String, SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// True iff the computed digest equals `provided` exactly. Errors are logged and yield false.
pub fn verify(body: &[u8], provided: &str, secret: Option<&str>) -> bool {
    match compute_signature(body, secret) {
        Ok(expected) => expected == provided,
        Err(e) => {
            log::error!("[ERROR in validateSignature] {}", e);
            false
        }
    }
}

/// Check a request: absent header => `Absent`, otherwise `Valid`/`Invalid` per [`verify`].
pub fn check(body: &[u8], provided: Option<&str>, secret: Option<&str>) -> SignatureCheck {
    match provided {
        None => SignatureCheck::Absent,
        Some(sig) if verify(body, sig, secret) => SignatureCheck::Valid,
        Some(_) => SignatureCheck::Invalid,
    }
}

/// First header whose lower-cased name contains [`SIGNATURE_HEADER_MARKER`] (e.g. `x-line-signature`).
/// Empty or non-UTF-8 values count as absent.
pub fn find_signature_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .iter()
        .find(|(name, _)| {
            name.as_str()
                .to_ascii_lowercase()
                .contains(SIGNATURE_HEADER_MARKER)
        })
        .and_then(|(_, value)| value.to_str().ok())
        .filter(|v| !v.is_empty())
}
