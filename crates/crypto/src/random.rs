//! Secure random source used for IV and key-material generation.

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::warn;

/// Selectable random-source algorithm.
///
/// `os` draws directly from the operating system CSPRNG; `chacha20` runs an
/// OS-seeded ChaCha20 generator in process. Unrecognised names fall back to
/// the default source with a warning rather than failing the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RngAlgorithm {
    /// Operating-system CSPRNG.
    #[default]
    Os,
    /// OS-seeded ChaCha20 generator.
    ChaCha20,
}

impl RngAlgorithm {
    /// Parse an algorithm name, falling back to the default on unknown names.
    pub fn parse(name: &str) -> Self {
        match name {
            "os" => RngAlgorithm::Os,
            "chacha20" => RngAlgorithm::ChaCha20,
            other => {
                warn!(
                    algorithm = %other,
                    "unknown RNG algorithm, falling back to the OS source"
                );
                RngAlgorithm::Os
            }
        }
    }

    /// The configuration name of this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            RngAlgorithm::Os => "os",
            RngAlgorithm::ChaCha20 => "chacha20",
        }
    }
}

/// A secure random byte source bound to one engine instance.
///
/// Not shared between threads; each engine owns its own source, the same way
/// it owns its key/IV state.
pub struct SecureRandom(Inner);

enum Inner {
    Os,
    ChaCha(Box<ChaCha20Rng>),
}

impl SecureRandom {
    /// Build a source for the given algorithm.
    pub fn new(algorithm: RngAlgorithm) -> Self {
        match algorithm {
            RngAlgorithm::Os => Self(Inner::Os),
            RngAlgorithm::ChaCha20 => Self(Inner::ChaCha(Box::new(ChaCha20Rng::from_entropy()))),
        }
    }

    /// Fill `dest` with random bytes.
    pub fn fill(&mut self, dest: &mut [u8]) {
        match &mut self.0 {
            Inner::Os => OsRng.fill_bytes(dest),
            Inner::ChaCha(rng) => rng.fill_bytes(dest),
        }
    }

    /// Generate `len` random bytes.
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes);
        bytes
    }
}

impl std::fmt::Debug for SecureRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            Inner::Os => "os",
            Inner::ChaCha(_) => "chacha20",
        };
        f.debug_tuple("SecureRandom").field(&name).finish()
    }
}
