//! Encoding and key-derivation helpers.

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeError, Engine as _};
use sha2::{Digest, Sha256};

/// Base64-encode bytes for persistence in table properties or field framing.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode Base64 text produced by [`encode_base64`].
///
/// # Errors
///
/// Returns the underlying decode error; callers map it into their own
/// taxonomy (bad table properties vs. bad field framing).
pub fn decode_base64(text: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(text.trim())
}

/// Derive key material of `bits` length from a password.
///
/// SHA-256 of the UTF-8 bytes, truncated to the requested length. Intended
/// for tooling and tests; production keys come from the key service.
pub fn derive_key(password: &str, bits: usize) -> Vec<u8> {
    let digest = Sha256::digest(password.as_bytes());
    let len = (bits / 8).min(digest.len());
    digest[..len].to_vec()
}
