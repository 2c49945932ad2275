//! AES-128-GCM with a random 96-bit IV and a detached 128-bit tag.
//!
//! No associated data is bound. The tag is verified before any plaintext is
//! produced; on mismatch the caller gets [`CipherError::AuthFailure`] and
//! nothing else.

use aes_gcm::{Aes128Gcm, Key, KeyInit, Nonce, Tag, aead::AeadInPlace};
use rand::{CryptoRng, RngCore};

use crate::error::CipherError;

/// Size of the AES-128 key.
pub const SESSION_KEY_SIZE: usize = 16;

/// Size of the GCM initialization vector.
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag.
pub const TAG_SIZE: usize = 16;

/// Largest plaintext GCM accepts under one IV: 2^36 - 32 bytes.
const MAX_PLAINTEXT_LEN: u64 = (1 << 36) - 32;

/// Output of [`encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Random IV used for this encryption.
    pub iv: [u8; IV_SIZE],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Authentication tag.
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt `plaintext` under `key` with a fresh IV drawn from `rng`.
///
/// # Errors
///
/// `PlaintextTooLong` if the plaintext is beyond the GCM length limit.
pub fn encrypt<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    key: &[u8; SESSION_KEY_SIZE],
    plaintext: &[u8],
) -> Result<Sealed, CipherError> {
    if plaintext.len() as u64 > MAX_PLAINTEXT_LEN {
        return Err(CipherError::PlaintextTooLong { len: plaintext.len() });
    }

    let mut iv = [0u8; IV_SIZE];
    rng.fill_bytes(&mut iv);

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), &[], &mut buffer)
        .map_err(|_| CipherError::PlaintextTooLong { len: plaintext.len() })?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed { iv, ciphertext: buffer, tag: tag_bytes })
}

/// Verify and decrypt.
///
/// # Errors
///
/// `AuthFailure` if the tag does not match the key, IV and ciphertext.
pub fn decrypt(
    key: &[u8; SESSION_KEY_SIZE],
    iv: &[u8; IV_SIZE],
    tag: &[u8; TAG_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(iv), &[], &mut buffer, Tag::from_slice(tag))
        .map_err(|_| CipherError::AuthFailure)?;
    Ok(buffer)
}
