//! `AES/CTR/NoPadding`: AES-128 in counter mode.
//!
//! CTR is a stream cipher: ciphertext length equals plaintext length and the
//! transform is its own inverse. Given a fixed key, IV, and plaintext the
//! output is deterministic, which is what lets a table decrypt values across
//! sessions from one persisted IV.

use std::io::{self, Read, Write};

use ::aes::cipher::{KeyIvInit, StreamCipher};
use ::aes::Aes128;
use zeroize::Zeroizing;

use super::{check_iv_length, check_key_length, ALGORITHM, BLOCK_SIZE, IV_LENGTH, KEY_LENGTH};
use crate::codec::{CodecConfig, CryptoCodec};
use crate::engine::{CipherState, Decryptor, Encryptor, FinishingWrite};
use crate::error::CryptoError;
use crate::key::Key;
use crate::random::SecureRandom;
use crate::suite::CipherSuite;

/// Big-endian counter over the full 128-bit block, matching the platform
/// `AES/CTR/NoPadding` transform.
type Aes128Ctr = ::ctr::Ctr128BE<Aes128>;

/// Codec for the `AES/CTR/NoPadding` suite.
#[derive(Debug)]
pub struct AesCtrCodec {
    rng_algorithm: crate::random::RngAlgorithm,
}

impl AesCtrCodec {
    /// Registry name of this codec implementation.
    pub const NAME: &'static str = "aes-ctr";

    /// Build the codec from resolved configuration.
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            rng_algorithm: config.rng_algorithm,
        }
    }
}

impl CryptoCodec for AesCtrCodec {
    fn cipher_suite(&self) -> CipherSuite {
        CipherSuite::AesCtrNoPadding
    }

    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn key_length(&self) -> usize {
        KEY_LENGTH
    }

    fn iv_length(&self) -> usize {
        IV_LENGTH
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn create_encryptor(&self) -> Box<dyn Encryptor> {
        Box::new(CtrEncryptor::new(SecureRandom::new(self.rng_algorithm)))
    }

    fn create_decryptor(&self) -> Box<dyn Decryptor> {
        Box::new(CtrDecryptor::new())
    }
}

fn build_transform(
    key: Option<&Zeroizing<Vec<u8>>>,
    iv: Option<&Vec<u8>>,
) -> Result<Aes128Ctr, CryptoError> {
    let key = key.ok_or_else(|| CryptoError::CipherInit("cipher key is not set".into()))?;
    let iv = iv.ok_or_else(|| CryptoError::CipherInit("cipher IV is not set".into()))?;
    Aes128Ctr::new_from_slices(key.as_slice(), iv.as_slice())
        .map_err(|e| CryptoError::CipherInit(e.to_string()))
}

/// Encrypting engine for `AES/CTR/NoPadding`.
pub struct CtrEncryptor {
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    rng: SecureRandom,
    state: CipherState<Aes128Ctr>,
}

impl CtrEncryptor {
    fn new(rng: SecureRandom) -> Self {
        Self {
            key: None,
            iv: None,
            rng,
            state: CipherState::Uninitialized,
        }
    }

    fn ensure_iv(&mut self) {
        if self.iv.is_none() {
            self.iv = Some(self.rng.random_bytes(IV_LENGTH));
        }
    }
}

impl Encryptor for CtrEncryptor {
    fn set_key(&mut self, key: &Key) -> Result<(), CryptoError> {
        check_key_length(key.material())?;
        self.key = Some(Zeroizing::new(key.material().to_vec()));
        self.state.invalidate();
        Ok(())
    }

    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError> {
        check_iv_length(iv)?;
        self.iv = Some(iv.to_vec());
        self.state.invalidate();
        Ok(())
    }

    fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    fn iv_length(&self) -> usize {
        IV_LENGTH
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn reset(&mut self) -> Result<(), CryptoError> {
        self.ensure_iv();
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        self.state.make_ready(|| build_transform(key, iv))
    }

    fn wrap_writer<'a>(
        &mut self,
        out: Box<dyn Write + 'a>,
    ) -> Result<Box<dyn FinishingWrite + 'a>, CryptoError> {
        self.ensure_iv();
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        let cipher = self.state.take_ready(|| build_transform(key, iv))?;
        Ok(Box::new(CtrWriter { cipher, out }))
    }
}

/// Decrypting engine for `AES/CTR/NoPadding`.
///
/// The IV must be set explicitly: decryption can only reproduce the
/// keystream the data was encrypted under.
pub struct CtrDecryptor {
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    state: CipherState<Aes128Ctr>,
}

impl CtrDecryptor {
    fn new() -> Self {
        Self {
            key: None,
            iv: None,
            state: CipherState::Uninitialized,
        }
    }
}

impl Decryptor for CtrDecryptor {
    fn set_key(&mut self, key: &Key) -> Result<(), CryptoError> {
        check_key_length(key.material())?;
        self.key = Some(Zeroizing::new(key.material().to_vec()));
        self.state.invalidate();
        Ok(())
    }

    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError> {
        check_iv_length(iv)?;
        self.iv = Some(iv.to_vec());
        self.state.invalidate();
        Ok(())
    }

    fn iv_length(&self) -> usize {
        IV_LENGTH
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    fn reset(&mut self) -> Result<(), CryptoError> {
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        self.state.make_ready(|| build_transform(key, iv))
    }

    fn wrap_reader<'a>(
        &mut self,
        input: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>, CryptoError> {
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        let cipher = self.state.take_ready(|| build_transform(key, iv))?;
        Ok(Box::new(CtrReader { cipher, input }))
    }
}

struct CtrWriter<'a> {
    cipher: Aes128Ctr,
    out: Box<dyn Write + 'a>,
}

impl Write for CtrWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut scratch = buf.to_vec();
        self.cipher.apply_keystream(&mut scratch);
        self.out.write_all(&scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl FinishingWrite for CtrWriter<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.out.flush()
    }
}

struct CtrReader<'a> {
    cipher: Aes128Ctr,
    input: Box<dyn Read + 'a>,
}

impl Read for CtrReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}
