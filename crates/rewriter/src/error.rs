//! Error type for the rewrite pipeline.

use crypto::{CryptoError, KeyError};
use thiserror::Error;

/// Errors produced while initialising or running the field rewrite pipeline.
///
/// Only two failure causes are ever absorbed into pass-through mode, and
/// only during mapping initialisation: missing encryption configuration and
/// key-service failures. Everything else (unknown suites, codec mismatches,
/// bad key/IV material, transform failures) propagates.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// A crypto-layer failure: suite resolution, codec lookup, engine
    /// initialisation, or the transform itself.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// A key-service failure.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Table properties are inconsistent with the encryption configuration.
    #[error("invalid table properties: {0}")]
    InvalidProperties(String),

    /// The plaintext does not fit the one-byte length frame used by
    /// length-exact suites.
    #[error("field of {len} bytes does not fit the one-byte length frame; \
             use a padded cipher suite for values over {max} bytes")]
    ValueTooLong { len: usize, max: usize },

    /// An encrypted field value does not match the expected framing.
    #[error("invalid encrypted field framing: {0}")]
    InvalidFraming(String),
}
