//! Encryptor/Decryptor capability traits and their shared plumbing.
//!
//! Engines are stateful wrappers around a cipher transform. Their lifecycle
//! is an explicit three-state machine:
//!
//! - **Uninitialized**: key and IV are not both set yet;
//! - **Ready**: a transform has been built against the current key+IV;
//! - **Stale**: the key or IV changed since the transform was built, or the
//!   transform was handed to a stream and consumed.
//!
//! `set_key`/`set_iv` move Ready→Stale, `reset` rebuilds the transform, and
//! wrapping a stream auto-initializes from Uninitialized/Stale. Every wrapped
//! stream takes the transform out of the engine, so the next wrap re-derives
//! a fresh transform from the cached key+IV, one transform per stream.
//!
//! Within one engine instance operations are strictly sequential; instances
//! are never shared between threads.

use std::io::{self, Read, Write};

use crate::error::CryptoError;
use crate::key::Key;

/// Engines apply a cipher to an output byte channel to produce ciphertext.
pub trait Encryptor: Send {
    /// Set the encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the material length does
    /// not match the codec's declared key length.
    fn set_key(&mut self, key: &Key) -> Result<(), CryptoError>;

    /// Set the initialization vector.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidIvLength`] on a length mismatch.
    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError>;

    /// The current IV, if one has been set or generated.
    ///
    /// When no IV was set explicitly, one is drawn from the secure random
    /// source the first time a stream is wrapped and becomes retrievable
    /// here so callers can persist it.
    fn iv(&self) -> Option<&[u8]>;

    /// Expected IV length in bytes.
    fn iv_length(&self) -> usize;

    /// The cipher's internal block size in bytes.
    fn block_size(&self) -> usize;

    /// Rebuild the transform from the current key and IV.
    fn reset(&mut self) -> Result<(), CryptoError>;

    /// Wrap an output channel with the cipher transform.
    ///
    /// The returned stream owns the transform; call
    /// [`FinishingWrite::finish`] to flush the final cipher block and the
    /// underlying writer.
    fn wrap_writer<'a>(
        &mut self,
        out: Box<dyn Write + 'a>,
    ) -> Result<Box<dyn FinishingWrite + 'a>, CryptoError>;
}

/// Engines apply a cipher to an input byte channel to recover plaintext.
pub trait Decryptor: Send {
    /// Set the decryption key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] on a length mismatch.
    fn set_key(&mut self, key: &Key) -> Result<(), CryptoError>;

    /// Set the initialization vector.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidIvLength`] on a length mismatch.
    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError>;

    /// Expected IV length in bytes.
    fn iv_length(&self) -> usize;

    /// The cipher's internal block size in bytes.
    fn block_size(&self) -> usize;

    /// Rebuild the transform from the current key and IV.
    fn reset(&mut self) -> Result<(), CryptoError>;

    /// Wrap an input channel with the cipher transform.
    fn wrap_reader<'a>(
        &mut self,
        input: Box<dyn Read + 'a>,
    ) -> Result<Box<dyn Read + 'a>, CryptoError>;
}

/// A cipher output stream that must be finished to flush the final block.
///
/// Dropping the stream without finishing releases the underlying writer but
/// may lose the trailing cipher block (the padded block, for block modes).
pub trait FinishingWrite: Write {
    /// Flush buffered cipher state and the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Lifecycle state of an engine's cipher transform.
pub(crate) enum CipherState<T> {
    Uninitialized,
    Ready(T),
    Stale,
}

impl<T> CipherState<T> {
    /// Ready → Stale; Uninitialized stays Uninitialized.
    pub(crate) fn invalidate(&mut self) {
        if matches!(self, CipherState::Ready(_)) {
            *self = CipherState::Stale;
        }
    }

    /// Force the Ready state by rebuilding the transform.
    pub(crate) fn make_ready(
        &mut self,
        build: impl FnOnce() -> Result<T, CryptoError>,
    ) -> Result<(), CryptoError> {
        *self = CipherState::Ready(build()?);
        Ok(())
    }

    /// Take the Ready transform, building one first if the engine is
    /// Uninitialized or Stale. The engine is left Stale: the caller owns the
    /// transform until it is consumed.
    pub(crate) fn take_ready(
        &mut self,
        build: impl FnOnce() -> Result<T, CryptoError>,
    ) -> Result<T, CryptoError> {
        match std::mem::replace(self, CipherState::Stale) {
            CipherState::Ready(transform) => Ok(transform),
            CipherState::Uninitialized | CipherState::Stale => build(),
        }
    }
}

fn operation_error(err: io::Error) -> CryptoError {
    CryptoError::Operation(err.to_string())
}

/// Encrypt a whole buffer through a freshly wrapped stream.
///
/// The wrapped stream is finished on the success path and released by drop on
/// every error path.
pub fn encrypt_buffer(
    encryptor: &mut dyn Encryptor,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(plaintext.len() + encryptor.block_size());
    let mut stream = encryptor.wrap_writer(Box::new(&mut out))?;
    stream.write_all(plaintext).map_err(operation_error)?;
    stream.finish().map_err(operation_error)?;
    Ok(out)
}

/// Encrypt everything readable from `input` into `out`.
pub fn encrypt_stream(
    encryptor: &mut dyn Encryptor,
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<(), CryptoError> {
    let mut stream = encryptor.wrap_writer(Box::new(out))?;
    io::copy(input, &mut stream).map_err(operation_error)?;
    stream.finish().map_err(operation_error)
}

/// Decrypt up to `plaintext_len` bytes from a ciphertext buffer.
///
/// The exact expected length must come from the caller: the no-padding
/// stream suite has no in-band length marker. Requesting fewer bytes than
/// were encrypted yields a truncated prefix; requesting more stops at the
/// end of the ciphertext (short read).
pub fn decrypt_buffer(
    decryptor: &mut dyn Decryptor,
    ciphertext: &[u8],
    plaintext_len: usize,
) -> Result<Vec<u8>, CryptoError> {
    let mut stream = decryptor.wrap_reader(Box::new(ciphertext))?;
    let mut out = vec![0u8; plaintext_len];
    let mut filled = 0;
    while filled < plaintext_len {
        let n = stream.read(&mut out[filled..]).map_err(operation_error)?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    out.truncate(filled);
    Ok(out)
}

/// Decrypt a whole ciphertext buffer, deriving the plaintext length from the
/// cipher itself (padding removal, for block modes).
pub fn decrypt_buffer_to_end(
    decryptor: &mut dyn Decryptor,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut stream = decryptor.wrap_reader(Box::new(ciphertext))?;
    let mut out = Vec::with_capacity(ciphertext.len());
    stream.read_to_end(&mut out).map_err(operation_error)?;
    Ok(out)
}

/// Decrypt up to `plaintext_len` bytes from `input` into `out`.
pub fn decrypt_stream(
    decryptor: &mut dyn Decryptor,
    input: &mut dyn Read,
    out: &mut dyn Write,
    plaintext_len: usize,
) -> Result<(), CryptoError> {
    let mut stream = decryptor.wrap_reader(Box::new(input))?;
    let mut buf = [0u8; 8 * 1024];
    let mut remaining = plaintext_len;
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = stream.read(&mut buf[..want]).map_err(operation_error)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(operation_error)?;
        remaining -= n;
    }
    Ok(())
}
