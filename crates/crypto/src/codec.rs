//! Codec abstraction and the static codec registry.

use tracing::{debug, warn};

use crate::aes::{AesCbcCodec, AesCtrCodec};
use crate::engine::{Decryptor, Encryptor};
use crate::error::CryptoError;
use crate::random::RngAlgorithm;
use crate::suite::CipherSuite;

/// A cryptographic codec: the per-algorithm factory for bound engines.
pub trait CryptoCodec: std::fmt::Debug + Send + Sync {
    /// The cipher suite this codec implements.
    fn cipher_suite(&self) -> CipherSuite;

    /// The base algorithm name.
    fn algorithm(&self) -> &'static str;

    /// Required key length in bytes.
    fn key_length(&self) -> usize;

    /// Expected initialization-vector length in bytes.
    fn iv_length(&self) -> usize;

    /// The cipher's internal block size in bytes.
    fn block_size(&self) -> usize;

    /// Create an encryptor for this codec.
    fn create_encryptor(&self) -> Box<dyn Encryptor>;

    /// Create a decryptor for this codec.
    fn create_decryptor(&self) -> Box<dyn Decryptor>;
}

/// Codec-level configuration, resolved once at construction.
#[derive(Debug, Clone, Default)]
pub struct CodecConfig {
    /// Names of the codec implementations to consider, in order. An empty
    /// list means encryption is not configured at all.
    pub codecs: Vec<String>,
    /// Random-source algorithm used for IV and key-material generation.
    pub rng_algorithm: RngAlgorithm,
}

/// The static registry: codec implementation names to compiled-in
/// constructors. Implementations are selected by configuration value, never
/// resolved at runtime by class name.
fn construct(name: &str, config: &CodecConfig) -> Option<Box<dyn CryptoCodec>> {
    match name {
        AesCtrCodec::NAME => Some(Box::new(AesCtrCodec::new(config))),
        AesCbcCodec::NAME => Some(Box::new(AesCbcCodec::new(config))),
        _ => None,
    }
}

/// Resolve a codec for the requested cipher suite.
///
/// Walks the configured codec names in order and returns the first whose
/// suite matches. A candidate that is unknown or implements a different
/// suite is skipped with a warning, so several candidates can coexist in the
/// configuration.
///
/// Returns `Ok(None)` when no codec is configured at all: the deliberate
/// opt-out path used when encryption is disabled.
///
/// # Errors
///
/// Returns [`CryptoError::NoAvailableCodec`] when codecs are configured but
/// none of them implements the requested suite. There is no silent fallback
/// to an unintended algorithm.
pub fn codec_for_suite(
    config: &CodecConfig,
    suite: CipherSuite,
) -> Result<Option<Box<dyn CryptoCodec>>, CryptoError> {
    if config.codecs.is_empty() {
        return Ok(None);
    }

    for name in &config.codecs {
        let Some(codec) = construct(name, config) else {
            warn!(codec = %name, "crypto codec is not available");
            continue;
        };
        if codec.cipher_suite().name() == suite.name() {
            debug!(codec = %name, suite = %suite, "using crypto codec");
            return Ok(Some(codec));
        }
        warn!(
            codec = %name,
            suite = %suite,
            "crypto codec does not meet the cipher suite"
        );
    }

    Err(CryptoError::NoAvailableCodec(suite.name().to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(codecs: &[&str]) -> CodecConfig {
        CodecConfig {
            codecs: codecs.iter().map(|s| (*s).to_owned()).collect(),
            rng_algorithm: RngAlgorithm::Os,
        }
    }

    #[test]
    fn no_codecs_configured_disables_encryption() {
        let resolved =
            codec_for_suite(&config_with(&[]), CipherSuite::AesCtrNoPadding).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn resolves_matching_codec() {
        let config = config_with(&["aes-ctr", "aes-cbc"]);

        let codec = codec_for_suite(&config, CipherSuite::AesCtrNoPadding)
            .unwrap()
            .unwrap();
        assert_eq!(codec.cipher_suite(), CipherSuite::AesCtrNoPadding);
        assert_eq!(codec.algorithm(), "AES");
        assert_eq!(codec.key_length(), 16);
        assert_eq!(codec.iv_length(), 16);

        let codec = codec_for_suite(&config, CipherSuite::AesCbcPkcs5Padding)
            .unwrap()
            .unwrap();
        assert_eq!(codec.cipher_suite(), CipherSuite::AesCbcPkcs5Padding);
    }

    #[test]
    fn unknown_candidates_are_skipped() {
        let config = config_with(&["openssl-ctr", "aes-ctr"]);
        let codec = codec_for_suite(&config, CipherSuite::AesCtrNoPadding)
            .unwrap()
            .unwrap();
        assert_eq!(codec.cipher_suite(), CipherSuite::AesCtrNoPadding);
    }

    #[test]
    fn mismatched_suite_is_fatal_when_nothing_matches() {
        let config = config_with(&["aes-cbc"]);
        let err = codec_for_suite(&config, CipherSuite::AesCtrNoPadding).unwrap_err();
        assert!(matches!(err, CryptoError::NoAvailableCodec(_)));
    }
}
