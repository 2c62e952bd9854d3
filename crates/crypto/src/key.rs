//! Named key material.

use std::fmt;

use zeroize::Zeroizing;

/// A named encryption key.
///
/// The material is owned by whichever component resolved the key (a
/// [`crate::KeyProvider`] result, or the rewriter's per-mapping cache) and is
/// zeroed when the key is dropped. Material length is validated by the
/// consuming engine, not here; different codecs declare different lengths.
#[derive(Clone)]
pub struct Key {
    name: String,
    material: Zeroizing<Vec<u8>>,
}

impl Key {
    /// Create a key from a name and raw material.
    pub fn new(name: impl Into<String>, material: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            material: Zeroizing::new(material),
        }
    }

    /// The key name, as known to the key service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw key material.
    pub fn material(&self) -> &[u8] {
        &self.material
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("material", &"[REDACTED]")
            .finish()
    }
}
