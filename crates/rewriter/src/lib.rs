//! Field-level encryption pipeline for delimited records.
//!
//! The host serializer drives this crate through two seams:
//!
//! - [`key_management::setup_table_for_encryption`]: run once per table by a
//!   DDL operation: resolves or creates the named keys in the key service and
//!   persists a random Base64 IV into the table properties.
//! - [`CryptoRewriter`]: built once per column mapping, then invoked per
//!   record, per field, through the [`FieldRewriter`] hooks. All key/IV
//!   resolution happens at initialisation; `encode`/`decode` never touch the
//!   network.
//!
//! Encryption is opt-in per table. When key names or the key-service URI are
//! not configured, or the key cannot be fetched, the rewriter degrades to
//! pass-through and returns field bytes unchanged.

pub mod config;
pub mod error;
pub mod key_management;
pub mod kms;
pub mod rewriter;
pub mod util;

pub use config::EncryptionConfig;
pub use error::RewriteError;
pub use kms::KmsClient;
pub use rewriter::{CryptoRewriter, FieldRewriter};
