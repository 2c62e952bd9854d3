//! Algorithm-agnostic column encryption primitives.
//!
//! This crate provides the building blocks the field rewrite pipeline is
//! assembled from:
//!
//! - [`CipherSuite`]: the closed registry of supported algorithm/mode/padding
//!   identities.
//! - [`CryptoCodec`]: per-algorithm factory for bound [`Encryptor`] /
//!   [`Decryptor`] engines, selected through a static registry by
//!   [`codec::codec_for_suite`].
//! - AES-128 engine implementations for `AES/CTR/NoPadding` and
//!   `AES/CBC/PKCS5Padding` in [`aes`].
//! - [`Key`] and the [`KeyProvider`] abstraction over a remote key service.
//!
//! Engines hold mutable key/IV/lifecycle state and are not safe for use from
//! multiple threads; parallel workers each own their own engine instances.

pub mod aes;
pub mod codec;
pub mod engine;
pub mod error;
pub mod key;
pub mod provider;
pub mod random;
pub mod suite;

pub use codec::{CodecConfig, CryptoCodec};
pub use engine::{Decryptor, Encryptor};
pub use error::CryptoError;
pub use key::Key;
pub use provider::{KeyError, KeyProvider, MemoryKeyProvider};
pub use suite::CipherSuite;
