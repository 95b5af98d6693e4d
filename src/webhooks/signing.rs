//! HMAC-SHA256 payload signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Hub-Signature-256` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes the hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
///
/// # Panics
///
/// This function will not panic. HMAC-SHA256 accepts keys of any length.
#[must_use]
#[allow(clippy::expect_used)] // HMAC-SHA256 accepts any key size, cannot fail
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a signature produced by [`compute_signature`].
///
/// Accepts the bare hex digest or the `sha256=` prefixed form, in either
/// case. The digest comparison is constant time. Intended for webhook
/// receivers.
///
/// ```rust
/// use hookrelay::webhooks::{compute_signature, verify_signature};
///
/// let signature = compute_signature("secret", b"{}");
/// assert!(verify_signature("secret", b"{}", &format!("sha256={signature}")));
/// ```
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let provided = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(digest) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&digest).is_ok()
}
