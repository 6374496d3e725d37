//! Payload signing for webhook deliveries.
//!
//! Receivers must recompute the signature over the literal received bytes,
//! not a re-serialized object, to detect corruption or tampering.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use ops_common::{OpsError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
///
/// An empty secret is a configuration error and is surfaced immediately,
/// never silently defaulted.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    if secret.is_empty() {
        return Err(OpsError::MissingSecret);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| OpsError::Config(format!("invalid signing key: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a received signature against `body` and `secret`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    match sign_payload(secret, body) {
        Ok(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
        Err(_) => false,
    }
}
