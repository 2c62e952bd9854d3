//! `AES/CBC/PKCS5Padding`: AES-128 in CBC mode with PKCS#7 padding.
//!
//! CBC pads, so ciphertext carries its own length: decryption strips the
//! padding and no out-of-band length is needed. The cost is expansion: the
//! ciphertext is the plaintext rounded up to the block size plus at least one
//! padding byte. Use CBC when the exact original length is not cheaply
//! available; use CTR when minimising expansion matters.

use std::io::{self, Read, Write};

use ::aes::cipher::generic_array::GenericArray;
use ::aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ::aes::Aes128;
use zeroize::Zeroizing;

use super::{check_iv_length, check_key_length, ALGORITHM, BLOCK_SIZE, IV_LENGTH, KEY_LENGTH};
use crate::codec::{CodecConfig, CryptoCodec};
use crate::engine::{CipherState, Decryptor, Encryptor, FinishingWrite};
use crate::error::CryptoError;
use crate::key::Key;
use crate::random::SecureRandom;
use crate::suite::CipherSuite;

type Aes128CbcEnc = ::cbc::Encryptor<Aes128>;
type Aes128CbcDec = ::cbc::Decryptor<Aes128>;

/// Codec for the `AES/CBC/PKCS5Padding` suite.
#[derive(Debug)]
pub struct AesCbcCodec {
    rng_algorithm: crate::random::RngAlgorithm,
}

impl AesCbcCodec {
    /// Registry name of this codec implementation.
    pub const NAME: &'static str = "aes-cbc";

    /// Build the codec from resolved configuration.
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            rng_algorithm: config.rng_algorithm,
        }
    }
}

impl CryptoCodec for AesCbcCodec {
    fn cipher_suite(&self) -> CipherSuite {
        CipherSuite::AesCbcPkcs5Padding
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
        Box::new(CbcEncryptor::new(SecureRandom::new(self.rng_algorithm)))
    }

    fn create_decryptor(&self) -> Box<dyn Decryptor> {
        Box::new(CbcDecryptor::new())
    }
}

fn build_encryptor(
    key: Option<&Zeroizing<Vec<u8>>>,
    iv: Option<&Vec<u8>>,
) -> Result<Aes128CbcEnc, CryptoError> {
    let key = key.ok_or_else(|| CryptoError::CipherInit("cipher key is not set".into()))?;
    let iv = iv.ok_or_else(|| CryptoError::CipherInit("cipher IV is not set".into()))?;
    Aes128CbcEnc::new_from_slices(key.as_slice(), iv.as_slice())
        .map_err(|e| CryptoError::CipherInit(e.to_string()))
}

fn build_decryptor(
    key: Option<&Zeroizing<Vec<u8>>>,
    iv: Option<&Vec<u8>>,
) -> Result<Aes128CbcDec, CryptoError> {
    let key = key.ok_or_else(|| CryptoError::CipherInit("cipher key is not set".into()))?;
    let iv = iv.ok_or_else(|| CryptoError::CipherInit("cipher IV is not set".into()))?;
    Aes128CbcDec::new_from_slices(key.as_slice(), iv.as_slice())
        .map_err(|e| CryptoError::CipherInit(e.to_string()))
}

/// Encrypting engine for `AES/CBC/PKCS5Padding`.
pub struct CbcEncryptor {
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    rng: SecureRandom,
    state: CipherState<Aes128CbcEnc>,
}

impl CbcEncryptor {
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

impl Encryptor for CbcEncryptor {
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
        self.state.make_ready(|| build_encryptor(key, iv))
    }

    fn wrap_writer<'a>(
        &mut self,
        out: Box<dyn Write + 'a>,
    ) -> Result<Box<dyn FinishingWrite + 'a>, CryptoError> {
        self.ensure_iv();
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        let enc = self.state.take_ready(|| build_encryptor(key, iv))?;
        Ok(Box::new(CbcWriter {
            enc,
            buf: Vec::new(),
            out,
        }))
    }
}

/// Decrypting engine for `AES/CBC/PKCS5Padding`.
pub struct CbcDecryptor {
    key: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
    state: CipherState<Aes128CbcDec>,
}

impl CbcDecryptor {
    fn new() -> Self {
        Self {
            key: None,
            iv: None,
            state: CipherState::Uninitialized,
        }
    }
}

impl Decryptor for CbcDecryptor {
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
        self.state.make_ready(|| build_decryptor(key, iv))
    }

    fn wrap_reader<'a>(
        &mut self,
        input: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>, CryptoError> {
        let key = self.key.as_ref();
        let iv = self.iv.as_ref();
        let dec = self.state.take_ready(|| build_decryptor(key, iv))?;
        Ok(Box::new(CbcReader {
            dec,
            input,
            carry: Vec::new(),
            pending: Vec::new(),
            emitted: 0,
            eof: false,
        }))
    }
}

struct CbcWriter<'a> {
    enc: Aes128CbcEnc,
    // Plaintext not yet aligned to a block boundary.
    buf: Vec<u8>,
    out: Box<dyn Write + 'a>,
}

impl CbcWriter<'_> {
    fn drain_full_blocks(&mut self) -> io::Result<()> {
        let full = self.buf.len() - self.buf.len() % BLOCK_SIZE;
        if full == 0 {
            return Ok(());
        }
        for block in self.buf[..full].chunks_exact_mut(BLOCK_SIZE) {
            self.enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.out.write_all(&self.buf[..full])?;
        self.buf.drain(..full);
        Ok(())
    }
}

impl Write for CbcWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.drain_full_blocks()?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl FinishingWrite for CbcWriter<'_> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.drain_full_blocks()?;
        let CbcWriter { enc, buf, mut out } = *self;

        // The residual is under one block; PKCS#7 always emits a final padded
        // block, even for an empty residual.
        let residual_len = buf.len();
        let mut last = [0u8; BLOCK_SIZE];
        last[..residual_len].copy_from_slice(&buf);
        let padded = enc
            .encrypt_padded_mut::<Pkcs7>(&mut last, residual_len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "block padding failed"))?;
        out.write_all(padded)?;
        out.flush()
    }
}

struct CbcReader<'a> {
    dec: Aes128CbcDec,
    input: Box<dyn Read + 'a>,
    // Ciphertext bytes that do not yet form a full block.
    carry: Vec<u8>,
    // Decrypted plaintext. The final block is withheld until end of input so
    // its padding can be stripped.
    pending: Vec<u8>,
    emitted: usize,
    eof: bool,
}

impl CbcReader<'_> {
    fn available(&self) -> usize {
        let unread = self.pending.len() - self.emitted;
        if self.eof {
            unread
        } else {
            unread.saturating_sub(BLOCK_SIZE)
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 8 * 1024];
        let n = self.input.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
            if !self.carry.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "ciphertext length is not a multiple of the cipher block size",
                ));
            }
            if self.pending.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "ciphertext is empty",
                ));
            }
            let total = self.pending.len();
            let pad = pkcs7_pad_len(&self.pending[total - BLOCK_SIZE..])?;
            self.pending.truncate(total - pad);
            return Ok(());
        }

        self.carry.extend_from_slice(&chunk[..n]);
        let full = self.carry.len() - self.carry.len() % BLOCK_SIZE;
        for block in self.carry[..full].chunks_exact_mut(BLOCK_SIZE) {
            self.dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        self.pending.extend_from_slice(&self.carry[..full]);
        self.carry.drain(..full);
        Ok(())
    }
}

impl Read for CbcReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let available = self.available();
            if available > 0 {
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.emitted..self.emitted + n]);
                self.emitted += n;
                return Ok(n);
            }
            if self.eof {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}

// PKCS#7: the last byte is the pad length, and every pad byte carries it.
fn pkcs7_pad_len(block: &[u8]) -> io::Result<usize> {
    let Some(&pad_byte) = block.last() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid PKCS#7 padding",
        ));
    };
    let pad = pad_byte as usize;
    if pad == 0 || pad > block.len() || !block[block.len() - pad..].iter().all(|&b| b == pad_byte) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid PKCS#7 padding",
        ));
    }
    Ok(pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{decrypt_buffer_to_end, encrypt_buffer};
    use crate::random::RngAlgorithm;

    fn codec() -> AesCbcCodec {
        AesCbcCodec::new(&CodecConfig {
            codecs: vec![AesCbcCodec::NAME.to_owned()],
            rng_algorithm: RngAlgorithm::Os,
        })
    }

    fn engines(key: &Key, iv: &[u8]) -> (Box<dyn Encryptor>, Box<dyn Decryptor>) {
        let codec = codec();
        let mut encryptor = codec.create_encryptor();
        encryptor.set_key(key).unwrap();
        encryptor.set_iv(iv).unwrap();
        let mut decryptor = codec.create_decryptor();
        decryptor.set_key(key).unwrap();
        decryptor.set_iv(iv).unwrap();
        (encryptor, decryptor)
    }

    #[test]
    fn round_trip_across_block_boundaries() {
        let key = Key::new("test.k1", vec![0x33; KEY_LENGTH]);
        let (mut encryptor, mut decryptor) = engines(&key, &[0x44; IV_LENGTH]);

        for len in [0usize, 1, 15, 16, 17, 31, 32, 1000] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let ciphertext = encrypt_buffer(encryptor.as_mut(), &plaintext).unwrap();
            // Plaintext rounded up to the block size, plus one padding block
            // when already aligned.
            assert_eq!(ciphertext.len(), (len / BLOCK_SIZE + 1) * BLOCK_SIZE);
            let recovered = decrypt_buffer_to_end(decryptor.as_mut(), &ciphertext).unwrap();
            assert_eq!(recovered, plaintext);
        }
    }

    #[test]
    fn same_key_and_iv_is_deterministic() {
        let key = Key::new("test.k1", vec![0x33; KEY_LENGTH]);
        let (mut encryptor, _) = engines(&key, &[0x44; IV_LENGTH]);
        let first = encrypt_buffer(encryptor.as_mut(), b"same plaintext").unwrap();
        let second = encrypt_buffer(encryptor.as_mut(), b"same plaintext").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn chunked_writes_match_one_shot_encryption() {
        let key = Key::new("test.k1", vec![0x55; KEY_LENGTH]);
        let (mut encryptor, _) = engines(&key, &[0x66; IV_LENGTH]);
        let plaintext: Vec<u8> = (0..100).map(|i| i as u8).collect();

        let one_shot = encrypt_buffer(encryptor.as_mut(), &plaintext).unwrap();

        let mut chunked = Vec::new();
        let mut stream = encryptor.wrap_writer(Box::new(&mut chunked)).unwrap();
        for piece in plaintext.chunks(7) {
            stream.write_all(piece).unwrap();
        }
        stream.finish().unwrap();

        assert_eq!(one_shot, chunked);
    }

    #[test]
    fn misaligned_ciphertext_is_rejected() {
        let key = Key::new("test.k1", vec![0x77; KEY_LENGTH]);
        let (_, mut decryptor) = engines(&key, &[0x88; IV_LENGTH]);
        let err = decrypt_buffer_to_end(decryptor.as_mut(), &[0u8; 21]).unwrap_err();
        assert!(matches!(err, CryptoError::Operation(_)));
    }

    #[test]
    fn empty_ciphertext_is_rejected() {
        let key = Key::new("test.k1", vec![0x77; KEY_LENGTH]);
        let (_, mut decryptor) = engines(&key, &[0x88; IV_LENGTH]);
        let err = decrypt_buffer_to_end(decryptor.as_mut(), &[]).unwrap_err();
        assert!(matches!(err, CryptoError::Operation(_)));
    }

    #[test]
    fn bad_padding_is_rejected() {
        // Encrypt a raw all-zero block with no padding: it decrypts to a
        // block whose final byte is 0, which is never valid PKCS#7.
        let key = Key::new("test.k1", vec![0x77; KEY_LENGTH]);
        let iv = [0x88u8; IV_LENGTH];
        let mut block = [0u8; BLOCK_SIZE];
        let mut raw = Aes128CbcEnc::new_from_slices(key.material(), &iv).unwrap();
        raw.encrypt_block_mut(GenericArray::from_mut_slice(&mut block));

        let (_, mut decryptor) = engines(&key, &iv);
        let err = decrypt_buffer_to_end(decryptor.as_mut(), &block).unwrap_err();
        assert!(matches!(err, CryptoError::Operation(_)));
    }

    #[test]
    fn generated_iv_is_retrievable_and_decrypts() {
        let codec = codec();
        let key = Key::new("test.k1", vec![0x42; KEY_LENGTH]);

        let mut encryptor = codec.create_encryptor();
        encryptor.set_key(&key).unwrap();
        let ciphertext = encrypt_buffer(encryptor.as_mut(), b"persist me").unwrap();
        let iv = encryptor.iv().expect("IV generated at first use").to_vec();

        let mut decryptor = codec.create_decryptor();
        decryptor.set_key(&key).unwrap();
        decryptor.set_iv(&iv).unwrap();
        let recovered = decrypt_buffer_to_end(decryptor.as_mut(), &ciphertext).unwrap();
        assert_eq!(recovered, b"persist me");
    }

    #[test]
    fn rejects_wrong_key_and_iv_lengths() {
        let codec = codec();
        let mut encryptor = codec.create_encryptor();
        assert!(matches!(
            encryptor.set_key(&Key::new("bad", vec![0u8; 24])).unwrap_err(),
            CryptoError::InvalidKeyLength { .. }
        ));
        assert!(matches!(
            encryptor.set_iv(&[0u8; 8]).unwrap_err(),
            CryptoError::InvalidIvLength { .. }
        ));
    }

    #[test]
    fn pad_length_validation() {
        let mut block = [7u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 3;
        block[BLOCK_SIZE - 2] = 3;
        block[BLOCK_SIZE - 3] = 3;
        assert_eq!(pkcs7_pad_len(&block).unwrap(), 3);

        assert_eq!(pkcs7_pad_len(&[BLOCK_SIZE as u8; BLOCK_SIZE]).unwrap(), BLOCK_SIZE);

        // Pad byte of zero, oversized pad, and inconsistent pad bytes.
        assert!(pkcs7_pad_len(&[0u8; BLOCK_SIZE]).is_err());
        assert!(pkcs7_pad_len(&[17u8; BLOCK_SIZE]).is_err());
        let mut torn = [4u8; BLOCK_SIZE];
        torn[BLOCK_SIZE - 2] = 9;
        assert!(pkcs7_pad_len(&torn).is_err());
    }
}
