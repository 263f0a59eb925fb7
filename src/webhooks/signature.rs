//! HMAC signature verification for inbound webhooks
//!
//! The provider signs the raw request body with HMAC-SHA256 over a shared
//! secret and sends the hex digest in a header, optionally prefixed with
//! `sha256=`. Comparison is constant time via `Mac::verify_slice`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Verify the signature header against the raw body. Fails closed: a missing,
/// undecodable, or mismatched signature all reject the request.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), WebhookError> {
    let header = signature_header.ok_or(WebhookError::MissingSignature)?;

    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);

    let expected = hex::decode(hex_digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Compute the hex signature for a body. Test helper and documentation of the
/// provider's signing scheme.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
