//! Mailgun webhook signature verification.
//!
//! Mailgun signs every callback with HMAC-SHA256 over `timestamp` followed by
//! `token`, keyed by the account's signing key, and sends the hex digest in
//! the `signature` field.
//! Reference: https://documentation.mailgun.com/docs/mailgun/user-manual/events/webhooks/#securing-webhooks

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced while checking a webhook signature.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// The supplied signature is not valid hexadecimal.
    #[error("signature is not valid hex: {0}")]
    Decode(#[from] hex::FromHexError),

    /// The signing key was rejected when building the verifier.
    #[error("signing key must not be empty")]
    InvalidKey,
}

/// Verifies Mailgun webhook signatures against a fixed signing key.
///
/// The key is absorbed into the MAC state once at construction; each call
/// clones that state, so a verifier can be shared freely across tasks.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl SignatureVerifier {
    /// Create a verifier for the given signing key.
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(SignatureError::InvalidKey);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { mac })
    }

    /// Verify a `timestamp` / `token` / `signature` triple.
    ///
    /// Returns `Ok(true)` when the signature matches, `Ok(false)` when it is
    /// well-formed hex that does not match (including a wrong length), and
    /// `Err(SignatureError::Decode)` when it is not hex at all.
    pub fn verify(
        &self,
        timestamp: &str,
        token: &str,
        signature: &str,
    ) -> Result<bool, SignatureError> {
        let expected = self.digest(timestamp, token);
        let provided = hex::decode(signature)?;

        if provided.len() != expected.len() {
            debug!(
                expected_length = expected.len(),
                actual_length = provided.len(),
                "mailgun_signature_length_mismatch"
            );
        }

        let valid = signatures_match(&provided, &expected);
        debug!(valid = valid, "mailgun_signature_checked");
        Ok(valid)
    }

    /// Produce the lowercase hex signature Mailgun would send for these fields.
    pub fn sign(&self, timestamp: &str, token: &str) -> String {
        hex::encode(self.digest(timestamp, token))
    }

    fn digest(&self, timestamp: &str, token: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(timestamp.as_bytes());
        mac.update(token.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// Compare two decoded signatures without short-circuiting on the first
/// differing byte. Lengths are public, so a length mismatch returns early.
fn signatures_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided.ct_eq(expected).into()
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Verify a Mailgun webhook signature with a one-off key.
///
/// # Arguments
///
/// * `signing_key` - The account API key or dedicated webhook signing key
/// * `timestamp` - The 'timestamp' field from the webhook payload
/// * `token` - The 'token' field from the webhook payload
/// * `signature` - The 'signature' field from the webhook payload (hex)
pub fn verify_mailgun_signature(
    signing_key: &[u8],
    timestamp: &str,
    token: &str,
    signature: &str,
) -> Result<bool, SignatureError> {
    SignatureVerifier::new(signing_key)?.verify(timestamp, token, signature)
}

/// Check that a webhook timestamp lies within `max_age_seconds` of `now`.
///
/// Timestamps that are not Unix epoch seconds are never fresh. The string is
/// parsed exactly as it was signed, so surrounding whitespace is rejected.
pub fn is_timestamp_fresh(timestamp: &str, max_age_seconds: u64, now: u64) -> bool {
    match timestamp.parse::<u64>() {
        Ok(webhook_time) => now.abs_diff(webhook_time) <= max_age_seconds,
        Err(_) => false,
    }
}
