//! RSA key encapsulation (RSA-KEM) with a KDF1/SHA-1 key derivation step.
//!
//! # Algorithm
//!
//! ```text
//! k = byte length of n
//! encapsulate(pub, len):
//!     r  <- uniform [2, n - 1]
//!     Z  =  I2OSP(r, k)
//!     C  =  I2OSP(r^e mod n, k)
//!     return (KDF1(Z, len), C)
//!
//! decapsulate(priv, C, len):
//!     |C| == k and OS2IP(C) < n, else malformed
//!     return KDF1(I2OSP(OS2IP(C)^d mod n, k), len)
//!
//! KDF1(Z, len) = SHA1(Z || I2OSP(0, 4)) || SHA1(Z || I2OSP(1, 4)) || ... truncated to len
//! ```
//!
//! Every call to [`encapsulate`] draws a fresh `r`, so two encapsulations to
//! the same key never share a session key.

use std::fmt;

use num_bigint_dig::{BigUint, RandBigInt};
use rand::{CryptoRng, RngCore};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    traits::{PrivateKeyParts, PublicKeyParts},
};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KemError;

/// Output size of the KDF digest (SHA-1).
pub const KDF_DIGEST_SIZE: usize = 20;

/// Largest key length [`encapsulate`] and [`decapsulate`] will derive.
pub const MAX_KDF_OUTPUT: usize = KDF_DIGEST_SIZE * 255;

/// Symmetric key recovered from or produced by the KEM.
///
/// Zeroized on drop. `Debug` only reveals the length.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Borrow the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED; {} bytes])", self.0.len())
    }
}

/// Result of one encapsulation.
#[derive(Debug)]
pub struct Encapsulated {
    /// Derived symmetric key.
    pub key: SessionKey,
    /// Encrypted secret to ship to the key owner (modulus-sized).
    pub encapsulation: Vec<u8>,
}

/// Produce a fresh session key and its encapsulation under `public_key`.
///
/// # Errors
///
/// `InvalidKeyLength` if `key_len` is 0 or above [`MAX_KDF_OUTPUT`].
pub fn encapsulate<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    public_key: &RsaPublicKey,
    key_len: usize,
) -> Result<Encapsulated, KemError> {
    check_key_len(key_len)?;

    let n = public_key.n();
    let k = modulus_len(n);

    let r = rng.gen_biguint_range(&BigUint::from(2u32), n);
    let secret = Zeroizing::new(i2osp(&r, k));
    let c = r.modpow(public_key.e(), n);

    Ok(Encapsulated { key: kdf1(&secret, key_len), encapsulation: i2osp(&c, k) })
}

/// Recover the session key from `encapsulation` with `private_key`.
///
/// # Errors
///
/// - `InvalidKeyLength` if `key_len` is 0 or above [`MAX_KDF_OUTPUT`]
/// - `EncapsulationLength` if `encapsulation` is not exactly modulus-sized
/// - `EncapsulationOutOfRange` if its value is not below the modulus
pub fn decapsulate(
    private_key: &RsaPrivateKey,
    encapsulation: &[u8],
    key_len: usize,
) -> Result<SessionKey, KemError> {
    check_key_len(key_len)?;

    let n = private_key.n();
    let k = modulus_len(n);
    if encapsulation.len() != k {
        return Err(KemError::EncapsulationLength { expected: k, actual: encapsulation.len() });
    }

    let c = BigUint::from_bytes_be(encapsulation);
    if &c >= n {
        return Err(KemError::EncapsulationOutOfRange);
    }

    let r = c.modpow(private_key.d(), n);
    let secret = Zeroizing::new(i2osp(&r, k));
    Ok(kdf1(&secret, key_len))
}

fn check_key_len(key_len: usize) -> Result<(), KemError> {
    if key_len == 0 || key_len > MAX_KDF_OUTPUT {
        return Err(KemError::InvalidKeyLength { requested: key_len, max: MAX_KDF_OUTPUT });
    }
    Ok(())
}

fn modulus_len(n: &BigUint) -> usize {
    n.bits().div_ceil(8)
}

/// Big-endian encoding left-padded to exactly `len` bytes. `x` must fit.
fn i2osp(x: &BigUint, len: usize) -> Vec<u8> {
    let bytes = x.to_bytes_be();
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(&bytes);
    out
}

fn kdf1(secret: &[u8], len: usize) -> SessionKey {
    let mut out = Vec::with_capacity(len + KDF_DIGEST_SIZE);
    let mut counter: u32 = 0;
    while out.len() < len {
        let mut hasher = Sha1::new();
        hasher.update(secret);
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    SessionKey(out)
}
