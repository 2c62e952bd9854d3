//! The per-column encode/decode hooks.
//!
//! A [`CryptoRewriter`] is built once per column mapping. Initialisation
//! reads the table's key-name list and the persisted IV, resolves the codec
//! for the configured suite, and fetches the key from the key service;
//! that is the only network round trip. Per record, per field, the host calls
//! [`FieldRewriter::encode`] / [`FieldRewriter::decode`], which are pure
//! transforms over the cached key+IV.
//!
//! # Field framing
//!
//! An encrypted field value is `Base64(ciphertext)`, preceded by one raw
//! byte holding the original plaintext length when the suite cannot recover
//! the length itself (the no-padding stream suite):
//!
//! ```text
//! +------------------------------+
//! | 1 byte original length (CTR) |
//! +------------------------------+
//! | Base64(ciphertext)           |
//! +------------------------------+
//! ```
//!
//! The presence of the length byte is implied by the configured suite, not
//! detected from the data.

use crypto::codec::codec_for_suite;
use crypto::engine::{decrypt_buffer, decrypt_buffer_to_end, encrypt_buffer};
use crypto::{CipherSuite, Decryptor, Encryptor, KeyProvider};
use tracing::{debug, warn};

use crate::config::{EncryptionConfig, TableProperties, ENCRYPT_IV, ENCRYPT_KEY_NAMES};
use crate::error::RewriteError;
use crate::key_management::get_first_key;
use crate::kms::provider_for_uri;
use crate::util::{decode_base64, encode_base64};

/// Largest plaintext representable by the one-byte length frame.
const MAX_FRAMED_LEN: usize = u8::MAX as usize;

/// Per-field rewrite hooks invoked by the host's record serializer.
///
/// Implementations return either the input unchanged or a replacement byte
/// span; they never have other side effects.
pub trait FieldRewriter {
    /// Rewrite a field value on the write path.
    fn encode(&mut self, index: usize, input: &[u8]) -> Result<Vec<u8>, RewriteError>;

    /// Rewrite a field value on the read path.
    fn decode(&mut self, index: usize, input: &[u8]) -> Result<Vec<u8>, RewriteError>;
}

enum Mode {
    PassThrough,
    Encrypting {
        suite: CipherSuite,
        encryptor: Box<dyn Encryptor>,
        decryptor: Box<dyn Decryptor>,
        length_framed: bool,
    },
}

/// Field rewriter that encrypts and decrypts individual column values.
///
/// Encryption is opt-in: when the table carries no key names, no key-service
/// URI is configured, or the key cannot be fetched, the rewriter runs in
/// pass-through mode and returns field bytes unchanged. A key that was
/// reachable at write time but is not at read time therefore yields raw
/// (still-encrypted) bytes rather than a failed query; the degrade is loud
/// in the logs, and callers that need hard failure can check
/// [`CryptoRewriter::is_encrypting`] after initialisation.
pub struct CryptoRewriter {
    mode: Mode,
}

impl std::fmt::Debug for CryptoRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoRewriter").finish_non_exhaustive()
    }
}

impl CryptoRewriter {
    /// Build a rewriter in pass-through mode.
    pub fn pass_through() -> Self {
        Self {
            mode: Mode::PassThrough,
        }
    }

    /// Initialise a rewriter for one column mapping, resolving the key
    /// provider from the configured key-service URI.
    ///
    /// # Errors
    ///
    /// Fails on an unknown cipher suite, a codec/suite mismatch, a missing
    /// or undecodable persisted IV, and invalid key material. Missing
    /// configuration and key-service failures degrade to pass-through
    /// instead.
    pub async fn init(
        column_names: &[String],
        properties: &TableProperties,
        config: &EncryptionConfig,
    ) -> Result<Self, RewriteError> {
        let Some(key_names) = configured_key_names(properties) else {
            warn!("table property {ENCRYPT_KEY_NAMES} is not set; field encryption disabled");
            return Ok(Self::pass_through());
        };
        let Some(uri) = config.key_service_uri.as_deref() else {
            warn!("no key service URI configured; field encryption disabled");
            return Ok(Self::pass_through());
        };
        let provider = match provider_for_uri(uri, config.key_service_timeout()) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "cannot reach the key service; falling back to pass-through");
                return Ok(Self::pass_through());
            }
        };
        Self::init_with_provider(column_names, properties, config, provider.as_ref()).await
    }

    /// [`CryptoRewriter::init`] with an explicit key provider.
    pub async fn init_with_provider(
        column_names: &[String],
        properties: &TableProperties,
        config: &EncryptionConfig,
        provider: &dyn KeyProvider,
    ) -> Result<Self, RewriteError> {
        let Some(key_names) = configured_key_names(properties) else {
            warn!("table property {ENCRYPT_KEY_NAMES} is not set; field encryption disabled");
            return Ok(Self::pass_through());
        };

        // Suite and codec resolution fails loudly: this is misconfiguration,
        // not an unavailable collaborator.
        let suite = config.suite()?;
        let Some(codec) = codec_for_suite(&config.codec_config(), suite)? else {
            warn!("no crypto codec configured; field encryption disabled");
            return Ok(Self::pass_through());
        };

        // The one network round trip. Key-service failures degrade.
        let key = match get_first_key(provider, &key_names).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "cannot fetch the encryption key; falling back to pass-through");
                return Ok(Self::pass_through());
            }
        };

        // Keys are configured, so a missing or undecodable IV means the
        // table metadata is broken; encrypting under a fresh IV would
        // corrupt every existing row.
        let iv_text = properties.get(ENCRYPT_IV).ok_or_else(|| {
            RewriteError::InvalidProperties(format!(
                "{ENCRYPT_KEY_NAMES} is set but {ENCRYPT_IV} is missing; \
                 was the table set up for encryption?"
            ))
        })?;
        let iv = decode_base64(iv_text).map_err(|e| {
            RewriteError::InvalidProperties(format!("{ENCRYPT_IV} is not valid Base64: {e}"))
        })?;

        let mut encryptor = codec.create_encryptor();
        encryptor.set_key(&key)?;
        encryptor.set_iv(&iv)?;
        let mut decryptor = codec.create_decryptor();
        decryptor.set_key(&key)?;
        decryptor.set_iv(&iv)?;

        debug!(
            suite = %suite,
            key = %key.name(),
            columns = column_names.len(),
            "field rewriter initialised"
        );
        Ok(Self {
            mode: Mode::Encrypting {
                suite,
                encryptor,
                decryptor,
                length_framed: suite.requires_plaintext_length(),
            },
        })
    }

    /// Whether this rewriter actually encrypts, as opposed to passing
    /// fields through unchanged.
    pub fn is_encrypting(&self) -> bool {
        matches!(self.mode, Mode::Encrypting { .. })
    }

    /// The active cipher suite, when encrypting.
    pub fn suite(&self) -> Option<CipherSuite> {
        match &self.mode {
            Mode::PassThrough => None,
            Mode::Encrypting { suite, .. } => Some(*suite),
        }
    }
}

impl FieldRewriter for CryptoRewriter {
    fn encode(&mut self, _index: usize, input: &[u8]) -> Result<Vec<u8>, RewriteError> {
        match &mut self.mode {
            Mode::PassThrough => Ok(input.to_vec()),
            Mode::Encrypting {
                encryptor,
                length_framed,
                ..
            } => {
                if *length_framed && input.len() > MAX_FRAMED_LEN {
                    return Err(RewriteError::ValueTooLong {
                        len: input.len(),
                        max: MAX_FRAMED_LEN,
                    });
                }

                let ciphertext = encrypt_buffer(encryptor.as_mut(), input)?;
                let wrapped = encode_base64(&ciphertext);

                if *length_framed {
                    let mut out = Vec::with_capacity(1 + wrapped.len());
                    out.push(input.len() as u8);
                    out.extend_from_slice(wrapped.as_bytes());
                    Ok(out)
                } else {
                    Ok(wrapped.into_bytes())
                }
            }
        }
    }

    fn decode(&mut self, _index: usize, input: &[u8]) -> Result<Vec<u8>, RewriteError> {
        match &mut self.mode {
            Mode::PassThrough => Ok(input.to_vec()),
            Mode::Encrypting {
                decryptor,
                length_framed,
                ..
            } => {
                if *length_framed {
                    let (&length_byte, wrapped) = input.split_first().ok_or_else(|| {
                        RewriteError::InvalidFraming("encrypted value is empty".into())
                    })?;
                    let ciphertext = unwrap_base64(wrapped)?;
                    let expected_len = length_byte as usize;
                    let plaintext =
                        decrypt_buffer(decryptor.as_mut(), &ciphertext, expected_len)?;
                    if plaintext.len() != expected_len {
                        return Err(RewriteError::InvalidFraming(format!(
                            "ciphertext yields {} bytes but the frame promises {expected_len}",
                            plaintext.len()
                        )));
                    }
                    Ok(plaintext)
                } else {
                    let ciphertext = unwrap_base64(input)?;
                    Ok(decrypt_buffer_to_end(decryptor.as_mut(), &ciphertext)?)
                }
            }
        }
    }
}

fn configured_key_names(properties: &TableProperties) -> Option<String> {
    properties
        .get(ENCRYPT_KEY_NAMES)
        .filter(|v| !v.is_empty())
        .cloned()
}

fn unwrap_base64(wrapped: &[u8]) -> Result<Vec<u8>, RewriteError> {
    let text = std::str::from_utf8(wrapped).map_err(|_| {
        RewriteError::InvalidFraming("encrypted payload is not Base64 text".into())
    })?;
    decode_base64(text)
        .map_err(|e| RewriteError::InvalidFraming(format!("bad Base64 payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crypto::{CryptoError, Key, KeyError, MemoryKeyProvider};
    use mockall::mock;

    use crate::key_management::setup_table_with_provider;

    mock! {
        Provider {}

        #[async_trait]
        impl KeyProvider for Provider {
            async fn get_key(&self, name: &str) -> Result<Option<Key>, KeyError>;
            async fn create_key(
                &self,
                name: &str,
                material: &[u8],
                cipher: &str,
            ) -> Result<Key, KeyError>;
            async fn delete_key(&self, name: &str) -> Result<(), KeyError>;
        }
    }

    fn columns() -> Vec<String> {
        vec!["id".to_owned(), "ssn".to_owned()]
    }

    fn props_with_keys() -> TableProperties {
        let mut props = TableProperties::new();
        props.insert(ENCRYPT_KEY_NAMES.to_owned(), "tbl.k1".to_owned());
        props
    }

    fn cbc_config() -> EncryptionConfig {
        EncryptionConfig {
            cipher_suite: "AES/CBC/PKCS5Padding".into(),
            ..EncryptionConfig::default()
        }
    }

    async fn encrypting_rewriter(config: &EncryptionConfig) -> CryptoRewriter {
        let provider = MemoryKeyProvider::new();
        let mut props = props_with_keys();
        setup_table_with_provider(&provider, config, &mut props)
            .await
            .unwrap();
        let rewriter =
            CryptoRewriter::init_with_provider(&columns(), &props, config, &provider)
                .await
                .unwrap();
        assert!(rewriter.is_encrypting());
        rewriter
    }

    #[tokio::test]
    async fn no_key_names_means_pass_through() {
        let config = EncryptionConfig::default();
        let rewriter = CryptoRewriter::init(&columns(), &TableProperties::new(), &config)
            .await
            .unwrap();
        assert!(!rewriter.is_encrypting());
    }

    #[tokio::test]
    async fn no_key_service_uri_means_pass_through() {
        let config = EncryptionConfig::default();
        let rewriter = CryptoRewriter::init(&columns(), &props_with_keys(), &config)
            .await
            .unwrap();
        assert!(!rewriter.is_encrypting());
    }

    #[test]
    fn pass_through_returns_input_unchanged() {
        let mut rewriter = CryptoRewriter::pass_through();
        for input in [&b""[..], b"plain", &[0xFFu8; 300][..]] {
            assert_eq!(rewriter.encode(0, input).unwrap(), input);
            assert_eq!(rewriter.decode(0, input).unwrap(), input);
        }
    }

    #[tokio::test]
    async fn missing_key_degrades_to_pass_through() {
        // Provider is reachable but holds no keys.
        let provider = MemoryKeyProvider::new();
        let mut props = props_with_keys();
        props.insert(ENCRYPT_IV.to_owned(), encode_base64(&[0u8; 16]));
        let config = EncryptionConfig::default();

        let rewriter =
            CryptoRewriter::init_with_provider(&columns(), &props, &config, &provider)
                .await
                .unwrap();
        assert!(!rewriter.is_encrypting());
    }

    #[tokio::test]
    async fn unauthorized_key_access_degrades_to_pass_through() {
        let mut provider = MockProvider::new();
        provider
            .expect_get_key()
            .returning(|name| Err(KeyError::Unauthorized(name.to_owned())));

        let mut props = props_with_keys();
        props.insert(ENCRYPT_IV.to_owned(), encode_base64(&[0u8; 16]));
        let config = EncryptionConfig::default();

        let rewriter =
            CryptoRewriter::init_with_provider(&columns(), &props, &config, &provider)
                .await
                .unwrap();
        assert!(!rewriter.is_encrypting());
    }

    #[tokio::test]
    async fn unreachable_key_service_degrades_to_pass_through() {
        let mut provider = MockProvider::new();
        provider
            .expect_get_key()
            .returning(|_| Err(KeyError::Unavailable("connection refused".into())));

        let mut props = props_with_keys();
        props.insert(ENCRYPT_IV.to_owned(), encode_base64(&[0u8; 16]));
        let config = EncryptionConfig::default();

        let rewriter =
            CryptoRewriter::init_with_provider(&columns(), &props, &config, &provider)
                .await
                .unwrap();
        assert!(!rewriter.is_encrypting());
    }

    #[tokio::test]
    async fn unknown_suite_is_fatal() {
        let provider = MemoryKeyProvider::new();
        let config = EncryptionConfig {
            cipher_suite: "AES/XTS/NoPadding".into(),
            ..EncryptionConfig::default()
        };
        let err = CryptoRewriter::init_with_provider(
            &columns(),
            &props_with_keys(),
            &config,
            &provider,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RewriteError::Crypto(CryptoError::UnknownSuite(_))
        ));
    }

    #[tokio::test]
    async fn missing_iv_is_fatal() {
        let provider = MemoryKeyProvider::new();
        provider
            .create_key("tbl.k1", &[0u8; 16], "AES/CTR/NoPadding")
            .await
            .unwrap();
        let config = EncryptionConfig::default();

        let err = CryptoRewriter::init_with_provider(
            &columns(),
            &props_with_keys(),
            &config,
            &provider,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RewriteError::InvalidProperties(_)));
    }

    #[tokio::test]
    async fn garbage_iv_is_fatal() {
        let provider = MemoryKeyProvider::new();
        provider
            .create_key("tbl.k1", &[0u8; 16], "AES/CTR/NoPadding")
            .await
            .unwrap();
        let mut props = props_with_keys();
        props.insert(ENCRYPT_IV.to_owned(), "!not base64!".to_owned());
        let config = EncryptionConfig::default();

        let err = CryptoRewriter::init_with_provider(&columns(), &props, &config, &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::InvalidProperties(_)));
    }

    #[tokio::test]
    async fn ctr_round_trip_with_length_framing() {
        let config = EncryptionConfig::default();
        let mut rewriter = encrypting_rewriter(&config).await;
        assert_eq!(rewriter.suite(), Some(CipherSuite::AesCtrNoPadding));

        for input in [&b""[..], b"x", b"hello world", &[0x7Fu8; 255][..]] {
            let encoded = rewriter.encode(1, input).unwrap();
            // One raw length byte, then Base64 text.
            assert_eq!(encoded[0] as usize, input.len());
            assert!(encoded[1..].iter().all(u8::is_ascii));
            assert_eq!(rewriter.decode(1, &encoded).unwrap(), input);
        }
    }

    #[tokio::test]
    async fn cbc_round_trip_without_length_framing() {
        let config = cbc_config();
        let mut rewriter = encrypting_rewriter(&config).await;
        assert_eq!(rewriter.suite(), Some(CipherSuite::AesCbcPkcs5Padding));

        for input in [&b""[..], b"hello world", &[0x7Fu8; 1000][..]] {
            let encoded = rewriter.encode(1, input).unwrap();
            // Pure Base64, no length byte; padded ciphertext is longer than
            // the plaintext.
            assert!(encoded.iter().all(u8::is_ascii));
            assert!(encoded.len() > input.len());
            assert_eq!(rewriter.decode(1, &encoded).unwrap(), input);
        }
    }

    #[tokio::test]
    async fn encoding_is_deterministic_across_records() {
        let config = EncryptionConfig::default();
        let mut rewriter = encrypting_rewriter(&config).await;
        let first = rewriter.encode(0, b"same value").unwrap();
        let second = rewriter.encode(0, b"same value").unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hello_world_under_zero_key_and_iv() {
        let provider = MemoryKeyProvider::new();
        provider
            .create_key("tbl.k1", &[0u8; 16], "AES/CTR/NoPadding")
            .await
            .unwrap();
        let mut props = props_with_keys();
        props.insert(ENCRYPT_IV.to_owned(), encode_base64(&[0u8; 16]));
        let config = EncryptionConfig::default();

        let mut rewriter =
            CryptoRewriter::init_with_provider(&columns(), &props, &config, &provider)
                .await
                .unwrap();
        assert!(rewriter.is_encrypting());

        let encoded = rewriter.encode(0, b"hello world").unwrap();
        assert_eq!(encoded[0], 11);
        // The framed payload is the Base64 of the AES-128-CTR ciphertext
        // under the zero key and zero IV.
        let ciphertext = decode_base64(std::str::from_utf8(&encoded[1..]).unwrap()).unwrap();
        assert_eq!(
            ciphertext,
            [0x0e, 0x8c, 0x27, 0xb8, 0x80, 0xaa, 0x5b, 0x54, 0xfa, 0x20, 0x9e]
        );

        assert_eq!(rewriter.decode(0, &encoded).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn values_over_the_frame_limit_are_rejected_under_ctr() {
        let config = EncryptionConfig::default();
        let mut rewriter = encrypting_rewriter(&config).await;
        let err = rewriter.encode(0, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, RewriteError::ValueTooLong { len: 256, .. }));
    }

    #[tokio::test]
    async fn long_values_are_fine_under_cbc() {
        let config = cbc_config();
        let mut rewriter = encrypting_rewriter(&config).await;
        let input = vec![0x42u8; 4096];
        let encoded = rewriter.encode(0, &input).unwrap();
        assert_eq!(rewriter.decode(0, &encoded).unwrap(), input);
    }

    #[tokio::test]
    async fn malformed_framing_is_rejected() {
        let config = EncryptionConfig::default();
        let mut rewriter = encrypting_rewriter(&config).await;

        assert!(matches!(
            rewriter.decode(0, b"").unwrap_err(),
            RewriteError::InvalidFraming(_)
        ));
        // Length byte present but the payload is not Base64.
        let mut bad = vec![5u8];
        bad.extend_from_slice(b"!!!!");
        assert!(matches!(
            rewriter.decode(0, &bad).unwrap_err(),
            RewriteError::InvalidFraming(_)
        ));
    }

    #[tokio::test]
    async fn frame_length_longer_than_ciphertext_is_rejected() {
        let config = EncryptionConfig::default();
        let mut rewriter = encrypting_rewriter(&config).await;

        let mut encoded = rewriter.encode(0, b"short").unwrap();
        // Claim more bytes than the ciphertext can yield.
        encoded[0] = 200;
        assert!(matches!(
            rewriter.decode(0, &encoded).unwrap_err(),
            RewriteError::InvalidFraming(_)
        ));
    }
}
