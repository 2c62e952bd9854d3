//! AES-128 codec variants built on the RustCrypto cipher primitives.
//!
//! Two concrete codecs:
//!
//! - [`AesCtrCodec`]: `AES/CTR/NoPadding`, a stream cipher. Ciphertext
//!   length equals plaintext length; the caller must track the original
//!   length to decrypt.
//! - [`AesCbcCodec`]: `AES/CBC/PKCS5Padding`, a padded block cipher.
//!   Ciphertext grows to the next block boundary plus at least one padding
//!   byte; decryption recovers the length from the padding.
//!
//! Both use 128-bit keys and IVs.

pub mod cbc;
pub mod ctr;

pub use cbc::AesCbcCodec;
pub use ctr::AesCtrCodec;

use crate::error::CryptoError;

/// AES key length in bytes.
pub const KEY_LENGTH: usize = 16;
/// AES IV length in bytes.
pub const IV_LENGTH: usize = 16;
/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;
/// Base algorithm name.
pub const ALGORITHM: &str = "AES";

pub(crate) fn check_key_length(material: &[u8]) -> Result<(), CryptoError> {
    if material.len() != KEY_LENGTH {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_LENGTH,
            got: material.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_iv_length(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != IV_LENGTH {
        return Err(CryptoError::InvalidIvLength {
            expected: IV_LENGTH,
            got: iv.len(),
        });
    }
    Ok(())
}
