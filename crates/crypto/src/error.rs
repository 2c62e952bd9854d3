//! Error type shared by the cipher-suite registry, codecs, and engines.

use thiserror::Error;

/// Errors produced by the crypto layer.
///
/// Configuration-time failures (`UnknownSuite`, `NoAvailableCodec`) surface
/// while a column mapping is being resolved, never mid-stream. Transform
/// failures (`Operation`) abort the record being processed and are not
/// retried: the transform is deterministic, so a retry on the same bytes
/// cannot succeed.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The cipher-suite name does not match any registered suite.
    #[error("invalid cipher suite name: {0}")]
    UnknownSuite(String),

    /// No configured codec implements the requested cipher suite.
    #[error("no available crypto codec for cipher suite {0}")]
    NoAvailableCodec(String),

    /// Key material has the wrong length for the codec.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// The initialization vector has the wrong length for the codec.
    #[error("invalid IV length: expected {expected} bytes, got {got}")]
    InvalidIvLength { expected: usize, got: usize },

    /// The underlying cipher rejected the key/IV, or they were never set.
    #[error("cipher initialisation failed: {0}")]
    CipherInit(String),

    /// The cipher transform itself failed (corrupted ciphertext, bad padding).
    #[error("cipher operation failed: {0}")]
    Operation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = CryptoError::UnknownSuite("AES/XTS/NoPadding".into());
        assert!(e.to_string().contains("AES/XTS/NoPadding"));

        let e = CryptoError::InvalidKeyLength {
            expected: 16,
            got: 7,
        };
        assert!(e.to_string().contains("16"));
        assert!(e.to_string().contains('7'));
    }
}
