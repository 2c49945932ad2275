//! Public key handles: the interchange form of a recipient's key.
//!
//! A handle is the RSA modulus as lowercase hex with no prefix. The public
//! exponent is not transmitted; it is always [`PUBLIC_EXPONENT`].

use std::{fmt, str::FromStr};

use num_bigint_dig::BigUint;
use rsa::{RsaPrivateKey, RsaPublicKey, traits::PublicKeyParts};

use crate::{
    derivation::{MAX_MODULUS_BITS, MIN_MODULUS_BITS},
    error::HandleError,
};

/// Fixed RSA public exponent shared by every key.
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Validated hex-encoded RSA modulus.
///
/// Parsing normalizes to lowercase, so two handles for the same key compare
/// equal regardless of the case they were received in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyHandle {
    hex: String,
}

impl PublicKeyHandle {
    /// Parse a handle from its wire form.
    ///
    /// # Errors
    ///
    /// - `Empty` for an empty string
    /// - `Prefixed` for a `0x`/`0X` prefix
    /// - `InvalidHex` for any non-hex character
    /// - `ModulusSize` / `EvenModulus` / `Rejected` if the value cannot be an
    ///   RSA modulus
    pub fn parse(input: &str) -> Result<Self, HandleError> {
        Self::parse_with_key(input).map(|(handle, _)| handle)
    }

    /// Build the handle of an existing public key.
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self { hex: key.n().to_str_radix(16) }
    }

    /// Build the handle of a keypair's public half.
    pub fn from_private_key(key: &RsaPrivateKey) -> Self {
        Self { hex: key.n().to_str_radix(16) }
    }

    /// Wire form (lowercase hex, no prefix).
    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Reconstruct the RSA public key (exponent [`PUBLIC_EXPONENT`]).
    pub fn to_public_key(&self) -> Result<RsaPublicKey, HandleError> {
        Self::parse_with_key(&self.hex).map(|(_, key)| key)
    }

    /// Parse and build the public key in one pass.
    pub(crate) fn parse_with_key(input: &str) -> Result<(Self, RsaPublicKey), HandleError> {
        if input.is_empty() {
            return Err(HandleError::Empty);
        }
        if input.starts_with("0x") || input.starts_with("0X") {
            return Err(HandleError::Prefixed);
        }
        if let Some(position) = input.bytes().position(|b| !b.is_ascii_hexdigit()) {
            return Err(HandleError::InvalidHex { position });
        }

        let n = BigUint::parse_bytes(input.as_bytes(), 16)
            .ok_or(HandleError::InvalidHex { position: 0 })?;

        let bits = n.bits();
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) {
            return Err(HandleError::ModulusSize {
                bits,
                min: MIN_MODULUS_BITS,
                max: MAX_MODULUS_BITS,
            });
        }
        if n.to_bytes_be().last().is_some_and(|b| b & 1 == 0) {
            return Err(HandleError::EvenModulus);
        }

        let key = RsaPublicKey::new(n, BigUint::from(PUBLIC_EXPONENT))
            .map_err(|e| HandleError::Rejected { reason: e.to_string() })?;

        Ok((Self::from_public_key(&key), key))
    }
}

impl FromStr for PublicKeyHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PublicKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl AsRef<str> for PublicKeyHandle {
    fn as_ref(&self) -> &str {
        &self.hex
    }
}
