//! The closed set of supported cipher suites.

use std::fmt;

use crate::error::CryptoError;

/// A cipher-suite identity: algorithm/mode/padding name plus block size.
///
/// The set is closed; configuration values are resolved against it by exact
/// name match, and unknown names fail when the configuration is resolved
/// rather than on first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// AES-128 in CTR mode, no padding. Ciphertext length equals plaintext
    /// length; decryption needs the exact original length out of band.
    AesCtrNoPadding,
    /// AES-128 in CBC mode with PKCS#5 padding. Decryption recovers the
    /// length from the padding, at the cost of ciphertext expansion.
    AesCbcPkcs5Padding,
}

impl CipherSuite {
    /// Every registered suite, in resolution order.
    pub const ALL: [CipherSuite; 2] = [
        CipherSuite::AesCtrNoPadding,
        CipherSuite::AesCbcPkcs5Padding,
    ];

    /// The algorithm/mode/padding name of this suite.
    pub fn name(self) -> &'static str {
        match self {
            CipherSuite::AesCtrNoPadding => "AES/CTR/NoPadding",
            CipherSuite::AesCbcPkcs5Padding => "AES/CBC/PKCS5Padding",
        }
    }

    /// The cipher's block size in bytes.
    pub fn block_size(self) -> usize {
        match self {
            CipherSuite::AesCtrNoPadding | CipherSuite::AesCbcPkcs5Padding => 16,
        }
    }

    /// Whether decryption requires the exact plaintext length from the
    /// caller. True for no-padding stream modes, where there is no in-band
    /// length or padding marker; drives the length-prefixed field framing.
    pub fn requires_plaintext_length(self) -> bool {
        matches!(self, CipherSuite::AesCtrNoPadding)
    }

    /// Resolve a suite from its name.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownSuite`] if the name matches no
    /// registered suite.
    pub fn convert(name: &str) -> Result<Self, CryptoError> {
        Self::ALL
            .iter()
            .copied()
            .find(|suite| suite.name() == name)
            .ok_or_else(|| CryptoError::UnknownSuite(name.to_owned()))
    }

    /// Check that a name matches a registered suite.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownSuite`] if it does not.
    pub fn check_name(name: &str) -> Result<(), CryptoError> {
        Self::convert(name).map(|_| ())
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
