//! Configuration for the encryption pipeline.
//!
//! Site-wide settings live in [`EncryptionConfig`], loaded from the
//! environment or built programmatically by the host. Table-level settings
//! (key names, the persisted IV) travel in the table's properties map and
//! are read through the `ENCRYPT_*` property keys.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use crypto::codec::CodecConfig;
use crypto::random::RngAlgorithm;
use crypto::{CipherSuite, CryptoError};
use serde::Deserialize;

/// Table property: comma-separated names of the encryption keys, e.g.
/// `"tbl.k1,tbl.k2"`. Absent or empty means the table is not encrypted.
pub const ENCRYPT_KEY_NAMES: &str = "encrypt.keynames";

/// Table property: the Base64-encoded IV generated at table setup. The same
/// IV decrypts every record of the table for the life of its data; changing
/// it without re-encrypting corrupts reads.
pub const ENCRYPT_IV: &str = "encrypt.iv";

/// Table properties are an opaque key/value store persisted by the catalog.
pub type TableProperties = HashMap<String, String>;

/// Site-wide encryption configuration, resolved once and immutable after.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    /// Cipher-suite name, e.g. `"AES/CTR/NoPadding"`.
    #[serde(default = "default_cipher_suite")]
    pub cipher_suite: String,

    /// Comma-separated codec implementation names, tried in order. An empty
    /// string disables encryption entirely.
    #[serde(default = "default_codecs")]
    pub codecs: String,

    /// Random-source algorithm: `"os"` or `"chacha20"`. Unknown names fall
    /// back to `"os"` with a warning.
    #[serde(default = "default_rng_algorithm")]
    pub rng_algorithm: String,

    /// Key-service endpoint URI, e.g. `"https://kms.example.net:16000/kms/"`.
    /// Absent means encryption is unavailable (pass-through).
    #[serde(default)]
    pub key_service_uri: Option<String>,

    /// Request timeout for key-service calls, in seconds.
    #[serde(default = "default_key_service_timeout")]
    pub key_service_timeout_secs: u64,
}

fn default_cipher_suite() -> String {
    "AES/CTR/NoPadding".into()
}
fn default_codecs() -> String {
    "aes-ctr,aes-cbc".into()
}
fn default_rng_algorithm() -> String {
    "os".into()
}
fn default_key_service_timeout() -> u64 {
    30
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            cipher_suite: default_cipher_suite(),
            codecs: default_codecs(),
            rng_algorithm: default_rng_algorithm(),
            key_service_uri: None,
            key_service_timeout_secs: default_key_service_timeout(),
        }
    }
}

impl EncryptionConfig {
    /// Load and validate configuration from `ENCRYPT_*` environment
    /// variables (e.g. `ENCRYPT_CIPHER_SUITE`, `ENCRYPT_KEY_SERVICE_URI`).
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("ENCRYPT"))
            .build()
            .context("failed to build encryption configuration from environment")?;

        let c: EncryptionConfig = cfg
            .try_deserialize()
            .context("failed to deserialise encryption configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first
    /// failure. Suite names are checked here so a misconfiguration surfaces
    /// at resolution time, not mid-stream.
    pub fn validate(&self) -> Result<()> {
        CipherSuite::check_name(&self.cipher_suite)
            .with_context(|| format!("unsupported cipher suite {:?}", self.cipher_suite))?;
        if self.key_service_timeout_secs == 0 {
            anyhow::bail!("KEY_SERVICE_TIMEOUT_SECS must be > 0");
        }
        Ok(())
    }

    /// The configured cipher suite.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnknownSuite`] for unrecognised names.
    pub fn suite(&self) -> Result<CipherSuite, CryptoError> {
        CipherSuite::convert(&self.cipher_suite)
    }

    /// The codec-level view of this configuration.
    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            codecs: self
                .codecs
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            rng_algorithm: RngAlgorithm::parse(&self.rng_algorithm),
        }
    }

    /// The key-service request timeout.
    pub fn key_service_timeout(&self) -> Duration {
        Duration::from_secs(self.key_service_timeout_secs)
    }
}
