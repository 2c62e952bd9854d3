//! Key-provider abstraction over a remote key-management service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::key::Key;

/// Errors produced by a key provider.
///
/// `Unauthorized` is deliberately distinct from `NotFound` and `Unavailable`:
/// the rewrite pipeline degrades to pass-through on all three during mapping
/// initialization, but table setup treats every one of them as fatal, and
/// operators need to tell them apart in the logs.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The named key does not exist in the key service.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A key with this name already exists; creation never overwrites.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// The caller is not permitted to access or create the named key.
    #[error("not authorized to access key: {0}")]
    Unauthorized(String),

    /// The key service could not be reached, or timed out.
    #[error("key service unavailable: {0}")]
    Unavailable(String),

    /// The key service answered with something unusable.
    #[error("invalid key service response: {0}")]
    InvalidResponse(String),
}

/// Abstraction over a remote key-management service.
///
/// Calls block on a network round trip and belong in one-time setup or
/// mapping-initialization paths, never in the per-record hot path.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Fetch the current key for a name, or `None` if no such key exists.
    async fn get_key(&self, name: &str) -> Result<Option<Key>, KeyError>;

    /// Fetch keys for a set of names; entries for absent keys are `None`.
    async fn get_keys(&self, names: &[String]) -> Result<Vec<Option<Key>>, KeyError> {
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            keys.push(self.get_key(name).await?);
        }
        Ok(keys)
    }

    /// Create a new key with the given material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::AlreadyExists`] if the name is taken; existing
    /// material is never clobbered.
    async fn create_key(
        &self,
        name: &str,
        material: &[u8],
        cipher: &str,
    ) -> Result<Key, KeyError>;

    /// Delete the named key.
    async fn delete_key(&self, name: &str) -> Result<(), KeyError>;
}

/// In-process key provider backed by a map.
///
/// Used in tests and by embedded deployments that have no remote key
/// service. Shares the [`KeyProvider`] contract exactly, including the
/// create-never-overwrites rule.
#[derive(Clone, Default)]
pub struct MemoryKeyProvider {
    keys: Arc<RwLock<HashMap<String, StoredKey>>>,
}

#[derive(Clone)]
struct StoredKey {
    material: Vec<u8>,
    // Recorded at creation like the remote service does; not consulted on
    // fetch.
    #[allow(dead_code)]
    cipher: String,
}

impl MemoryKeyProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyProvider for MemoryKeyProvider {
    async fn get_key(&self, name: &str) -> Result<Option<Key>, KeyError> {
        let keys = self.keys.read().await;
        Ok(keys
            .get(name)
            .map(|stored| Key::new(name, stored.material.clone())))
    }

    async fn create_key(
        &self,
        name: &str,
        material: &[u8],
        cipher: &str,
    ) -> Result<Key, KeyError> {
        let mut keys = self.keys.write().await;
        if keys.contains_key(name) {
            return Err(KeyError::AlreadyExists(name.to_owned()));
        }
        keys.insert(
            name.to_owned(),
            StoredKey {
                material: material.to_vec(),
                cipher: cipher.to_owned(),
            },
        );
        Ok(Key::new(name, material.to_vec()))
    }

    async fn delete_key(&self, name: &str) -> Result<(), KeyError> {
        let mut keys = self.keys.write().await;
        if keys.remove(name).is_none() {
            return Err(KeyError::NotFound(name.to_owned()));
        }
        Ok(())
    }
}
