//! Table setup and key resolution against the key service.
//!
//! Setup runs once per table, typically from a DDL operation, and is the
//! only writer of the persisted IV. Key creation is fetch-then-create
//! (an existing key's material is never clobbered), which makes repeated
//! setup idempotent with respect to keys. Any key-service failure here is
//! fatal: a table must not come into existence half-configured, and no IV is
//! persisted when setup fails.

use crypto::codec::codec_for_suite;
use crypto::random::SecureRandom;
use crypto::{CryptoCodec, Key, KeyError, KeyProvider};
use tracing::{info, warn};

use crate::config::{EncryptionConfig, TableProperties, ENCRYPT_IV, ENCRYPT_KEY_NAMES};
use crate::error::RewriteError;
use crate::kms::provider_for_uri;
use crate::util::encode_base64;

/// Split a comma-separated key-name list, trimming whitespace and dropping
/// empty entries.
pub fn split_key_names(key_names: &str) -> Vec<String> {
    key_names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Set up a table for encryption, resolving the key provider from the
/// configured key-service URI.
///
/// A table without key names is simply not encrypted; key names without a
/// key-service URI get a warning and no setup, matching the opt-in contract.
///
/// # Errors
///
/// Key-service failures are fatal here: they abort the DDL operation and
/// leave no IV persisted.
pub async fn setup_table_for_encryption(
    config: &EncryptionConfig,
    table_props: &mut TableProperties,
) -> Result<(), RewriteError> {
    if !has_key_names(table_props) {
        return Ok(());
    }
    let Some(uri) = config.key_service_uri.as_deref() else {
        warn!("{ENCRYPT_KEY_NAMES} is set but no key service URI is configured; skipping encryption setup");
        return Ok(());
    };
    let provider = provider_for_uri(uri, config.key_service_timeout())?;
    setup_table_with_provider(provider.as_ref(), config, table_props).await
}

/// [`setup_table_for_encryption`] with an explicit provider.
pub async fn setup_table_with_provider(
    provider: &dyn KeyProvider,
    config: &EncryptionConfig,
    table_props: &mut TableProperties,
) -> Result<(), RewriteError> {
    let Some(key_names) = table_props
        .get(ENCRYPT_KEY_NAMES)
        .filter(|v| !v.is_empty())
        .cloned()
    else {
        return Ok(());
    };

    let suite = config.suite()?;
    let Some(codec) = codec_for_suite(&config.codec_config(), suite)? else {
        warn!(suite = %suite, "no crypto codec configured; skipping encryption setup");
        return Ok(());
    };

    create_keys(provider, &key_names, codec.as_ref(), config).await?;

    let mut rng = SecureRandom::new(config.codec_config().rng_algorithm);
    let iv = rng.random_bytes(codec.iv_length());
    table_props.insert(ENCRYPT_IV.to_owned(), encode_base64(&iv));
    info!(suite = %suite, "table configured for column encryption");
    Ok(())
}

/// Ensure every named key exists in the key service, creating absent ones
/// with fresh random material of the codec's key length.
pub async fn create_keys(
    provider: &dyn KeyProvider,
    key_names: &str,
    codec: &dyn CryptoCodec,
    config: &EncryptionConfig,
) -> Result<(), RewriteError> {
    let mut rng = SecureRandom::new(config.codec_config().rng_algorithm);
    for name in split_key_names(key_names) {
        if provider.get_key(&name).await?.is_none() {
            let material = rng.random_bytes(codec.key_length());
            provider
                .create_key(&name, &material, codec.cipher_suite().name())
                .await?;
            info!(key = %name, "created encryption key");
        }
    }
    Ok(())
}

/// Fetch the current key for the first name in the list.
///
/// All columns of a table currently share the first key.
///
/// # Errors
///
/// Returns [`KeyError::NotFound`] when the list is empty or the key does
/// not exist.
pub async fn get_first_key(
    provider: &dyn KeyProvider,
    key_names: &str,
) -> Result<Key, KeyError> {
    let names = split_key_names(key_names);
    let first = names
        .first()
        .ok_or_else(|| KeyError::NotFound(key_names.to_owned()))?;
    provider
        .get_key(first)
        .await?
        .ok_or_else(|| KeyError::NotFound(first.clone()))
}

/// Fetch the current key for every name in the list; absent keys yield
/// `None` entries.
pub async fn get_keys(
    provider: &dyn KeyProvider,
    key_names: &str,
) -> Result<Vec<Option<Key>>, KeyError> {
    provider.get_keys(&split_key_names(key_names)).await
}

fn has_key_names(table_props: &TableProperties) -> bool {
    table_props
        .get(ENCRYPT_KEY_NAMES)
        .is_some_and(|v| !v.is_empty())
}
