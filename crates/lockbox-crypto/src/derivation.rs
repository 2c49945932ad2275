//! Deterministic RSA keypair derivation from a wallet-signed seed.
//!
//! The seed is expanded into a 32-byte key for a ChaCha20 PRNG, which then
//! drives an incremental prime search. Same seed and same configuration
//! always produce the same keypair, so only the seed ever needs to be
//! stored.
//!
//! # Seed expansion
//!
//! - [`SeedExpansion::Hardened`] runs the seed through HKDF-SHA256. Every
//!   byte of the seed influences the key.
//! - [`SeedExpansion::Legacy`] repeats the seed until 32 bytes are available
//!   and truncates. Seeds longer than 32 bytes only contribute their prefix.
//!   Kept for deployments that already published keys derived this way.
//!
//! # Prime search
//!
//! ```text
//! candidate = PRNG(bits / 8) | 0b11 << (bits - 2) | 1
//! while !(probably_prime(candidate) && (candidate - 1) % e != 0):
//!     candidate += 2            (bounded by max_prime_candidates)
//! ```
//!
//! Setting the two top bits of both primes pins the modulus at exactly
//! `modulus_bits` bits.

use std::fmt;

use hkdf::Hkdf;
use num_bigint_dig::{BigUint, prime::probably_prime};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rsa::{RsaPrivateKey, traits::PublicKeyParts};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{error::DerivationError, handle::PUBLIC_EXPONENT};

/// Modulus size used when none is configured.
pub const DEFAULT_MODULUS_BITS: usize = 1024;

/// Smallest modulus size accepted for derivation and for recipient keys.
pub const MIN_MODULUS_BITS: usize = 512;

/// Largest modulus size accepted for derivation and for recipient keys.
pub const MAX_MODULUS_BITS: usize = 4096;

/// Default candidate budget per prime.
///
/// The average gap between 512-bit primes is about 355, so the search
/// touches a few hundred candidates in practice.
pub const DEFAULT_MAX_PRIME_CANDIDATES: usize = 1 << 16;

/// Size of the PRNG seed produced by expansion.
pub const PRNG_SEED_SIZE: usize = 32;

/// HKDF info string for [`SeedExpansion::Hardened`].
pub const HARDENED_EXPANSION_INFO: &[u8] = b"lockbox/keypair-seed/v1";

const PRIMALITY_ROUNDS: usize = 20;

/// Secret seed material, usually the raw bytes of a wallet signature.
///
/// Zeroized on drop. `Debug` only reveals the length.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Wrap raw seed bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the seed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Seed length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the seed holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Seed {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed([REDACTED; {} bytes])", self.0.len())
    }
}

/// How a seed is stretched into the PRNG key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SeedExpansion {
    /// Repeat-and-truncate. Reproduces keys derived by legacy deployments.
    Legacy,
    /// HKDF-SHA256 over the whole seed.
    #[default]
    Hardened,
}

/// Key derivation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationConfig {
    /// RSA modulus size in bits. Multiple of 16 within
    /// [`MIN_MODULUS_BITS`]..=[`MAX_MODULUS_BITS`].
    pub modulus_bits: usize,
    /// Seed expansion mode.
    pub seed_expansion: SeedExpansion,
    /// Candidates tested per prime before giving up.
    pub max_prime_candidates: usize,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            modulus_bits: DEFAULT_MODULUS_BITS,
            seed_expansion: SeedExpansion::default(),
            max_prime_candidates: DEFAULT_MAX_PRIME_CANDIDATES,
        }
    }
}

impl DerivationConfig {
    /// Default configuration with [`SeedExpansion::Legacy`].
    pub fn legacy() -> Self {
        Self { seed_expansion: SeedExpansion::Legacy, ..Self::default() }
    }

    fn validate(&self) -> Result<(), DerivationError> {
        let bits = self.modulus_bits;
        if !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(&bits) || !bits.is_multiple_of(16) {
            return Err(DerivationError::UnsupportedModulusSize { bits });
        }
        Ok(())
    }
}

/// Derive the RSA keypair for `seed`.
///
/// Pure function of `seed` and `config`: repeated calls, on any machine,
/// return the same key.
///
/// # Errors
///
/// - `EmptySeed` if `seed` is empty
/// - `UnsupportedModulusSize` if the configured size is out of range
/// - `PrimeSearchExhausted` if a prime is not found within the budget
/// - `DegeneratePrimes` / `InvalidKey` if the components do not form a key
pub fn derive_keypair(
    seed: &[u8],
    config: &DerivationConfig,
) -> Result<RsaPrivateKey, DerivationError> {
    if seed.is_empty() {
        return Err(DerivationError::EmptySeed);
    }
    config.validate()?;

    let prng_seed = expand_seed(seed, config.seed_expansion)?;
    let mut rng = ChaCha20Rng::from_seed(*prng_seed);

    let prime_bits = config.modulus_bits / 2;
    let p = search_prime(&mut rng, prime_bits, config.max_prime_candidates)?;
    let q = search_prime(&mut rng, prime_bits, config.max_prime_candidates)?;
    if p == q {
        return Err(DerivationError::DegeneratePrimes);
    }

    let key = RsaPrivateKey::from_p_q(p, q, BigUint::from(PUBLIC_EXPONENT))
        .map_err(|e| DerivationError::InvalidKey { reason: e.to_string() })?;

    let bits = key.n().bits();
    if bits != config.modulus_bits {
        return Err(DerivationError::InvalidKey {
            reason: format!("modulus has {bits} bits, expected {}", config.modulus_bits),
        });
    }

    tracing::debug!(
        modulus_bits = config.modulus_bits,
        expansion = ?config.seed_expansion,
        "derived keypair"
    );
    Ok(key)
}

/// Stretch `seed` into the 32-byte PRNG key.
///
/// # Errors
///
/// `EmptySeed` if `seed` is empty.
pub fn expand_seed(
    seed: &[u8],
    mode: SeedExpansion,
) -> Result<Zeroizing<[u8; PRNG_SEED_SIZE]>, DerivationError> {
    if seed.is_empty() {
        return Err(DerivationError::EmptySeed);
    }

    let mut out = Zeroizing::new([0u8; PRNG_SEED_SIZE]);
    match mode {
        SeedExpansion::Legacy => {
            for (dst, src) in out.iter_mut().zip(seed.iter().cycle()) {
                *dst = *src;
            }
        },
        SeedExpansion::Hardened => {
            Hkdf::<Sha256>::new(None, seed)
                .expand(HARDENED_EXPANSION_INFO, &mut out[..])
                .map_err(|e| DerivationError::InvalidKey { reason: e.to_string() })?;
        },
    }
    Ok(out)
}

fn search_prime(
    rng: &mut ChaCha20Rng,
    bits: usize,
    max_candidates: usize,
) -> Result<BigUint, DerivationError> {
    let mut bytes = Zeroizing::new(vec![0u8; bits / 8]);
    rng.fill_bytes(&mut bytes);

    bytes[0] |= 0xC0;
    if let Some(last) = bytes.last_mut() {
        *last |= 1;
    }

    let mut candidate = BigUint::from_bytes_be(&bytes);
    for _ in 0..max_candidates {
        if is_usable_prime(&candidate) {
            return Ok(candidate);
        }
        candidate += 2u32;
    }

    Err(DerivationError::PrimeSearchExhausted { bits, candidates: max_candidates })
}

/// `e` must be invertible modulo `p - 1`. `e` is prime, so it suffices that
/// it does not divide `p - 1`.
fn is_usable_prime(candidate: &BigUint) -> bool {
    (candidate - 1u32) % PUBLIC_EXPONENT != BigUint::from(0u32)
        && probably_prime(candidate, PRIMALITY_ROUNDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_SEED: &[u8; 32] = b"test-seed-deterministic-000001te";

    const GOLDEN_LEGACY_MODULUS: &str = "c8d4ec2ec5e66c74813982a6d60586fbb86ad109a5683cad3a2aedad\
        ff990a09be3e28f4d8e60df3d4bfab6f7108d63abeb120b7d93cc156aa6c53ea8adb10c757a38772afeaa428\
        2bbdb98988826712d14c0ba5ffc7a21323cfa85331eb325bb33c1407c5743bc3bb79ad95efaac57e01748ff0\
        f03f12c37378679467189ef3";

    const GOLDEN_HARDENED_MODULUS: &str = "a54c4543f1b440750f624d3e935e1442fc9688ead64dabc1550a8f\
        50fc8f4b4f8ec9dbd6d45cca8b27a02dc4815466757e17d417e3291de74cac2eef509292c23404f7f94b7901\
        0c021b822c54e685e85429c24f01e7ffbe39d9c28798328cc008637218b811264bdedc7bb51307d043ed082f\
        5cb1be2190510f26c839f22ca1";

    fn small_config(seed_expansion: SeedExpansion) -> DerivationConfig {
        DerivationConfig { modulus_bits: 512, seed_expansion, ..DerivationConfig::default() }
    }

    fn modulus_hex(key: &RsaPrivateKey) -> String {
        key.n().to_str_radix(16)
    }

    #[test]
    fn golden_vector_legacy() {
        let key = derive_keypair(GOLDEN_SEED, &DerivationConfig::legacy()).unwrap();
        assert_eq!(modulus_hex(&key), GOLDEN_LEGACY_MODULUS);
        assert_eq!(key.e(), &BigUint::from(PUBLIC_EXPONENT));
    }

    #[test]
    fn golden_vector_hardened() {
        let key = derive_keypair(GOLDEN_SEED, &DerivationConfig::default()).unwrap();
        assert_eq!(modulus_hex(&key), GOLDEN_HARDENED_MODULUS);
    }

    #[test]
    fn golden_seed_is_repeated_and_truncated_ascii() {
        let mut expected = b"test-seed-deterministic-000001".to_vec();
        expected.extend_from_slice(b"te");
        assert_eq!(GOLDEN_SEED.as_slice(), expected.as_slice());
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = b"0x5f1c3e9a-signature-bytes";
        for mode in [SeedExpansion::Legacy, SeedExpansion::Hardened] {
            let a = derive_keypair(seed, &small_config(mode)).unwrap();
            let b = derive_keypair(seed, &small_config(mode)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn different_seeds_derive_different_keys() {
        let config = small_config(SeedExpansion::Hardened);
        let a = derive_keypair(b"seed-a", &config).unwrap();
        let b = derive_keypair(b"seed-b", &config).unwrap();
        assert_ne!(a.n(), b.n());
    }

    #[test]
    fn modes_derive_different_keys() {
        let legacy = derive_keypair(GOLDEN_SEED, &small_config(SeedExpansion::Legacy)).unwrap();
        let hardened =
            derive_keypair(GOLDEN_SEED, &small_config(SeedExpansion::Hardened)).unwrap();
        assert_ne!(legacy.n(), hardened.n());
    }

    #[test]
    fn derived_modulus_has_configured_size() {
        for bits in [512, 768, 1024] {
            let config = DerivationConfig { modulus_bits: bits, ..DerivationConfig::default() };
            let key = derive_keypair(b"size-check", &config).unwrap();
            assert_eq!(key.n().bits(), bits);
        }
    }

    #[test]
    fn empty_seed_rejected() {
        let result = derive_keypair(b"", &DerivationConfig::default());
        assert_eq!(result, Err(DerivationError::EmptySeed));
    }

    #[test]
    fn unsupported_modulus_sizes_rejected() {
        for bits in [0, 256, 1000, 1030, 8192] {
            let config = DerivationConfig { modulus_bits: bits, ..DerivationConfig::default() };
            let result = derive_keypair(GOLDEN_SEED, &config);
            assert_eq!(result, Err(DerivationError::UnsupportedModulusSize { bits }));
        }
    }

    #[test]
    fn prime_search_is_bounded() {
        // The first golden prime sits 19 steps past its starting candidate.
        let config = DerivationConfig { max_prime_candidates: 10, ..DerivationConfig::legacy() };
        let result = derive_keypair(GOLDEN_SEED, &config);
        assert_eq!(
            result,
            Err(DerivationError::PrimeSearchExhausted { bits: 512, candidates: 10 })
        );
    }

    #[test]
    fn legacy_expansion_repeats_short_seed() {
        let out = expand_seed(b"abc", SeedExpansion::Legacy).unwrap();
        assert_eq!(&out[..], b"abcabcabcabcabcabcabcabcabcabcab");
    }

    #[test]
    fn legacy_expansion_truncates_long_seed() {
        let long = [7u8; 65];
        let out = expand_seed(&long, SeedExpansion::Legacy).unwrap();
        assert_eq!(&out[..], &long[..32]);
    }

    #[test]
    fn legacy_ignores_bytes_past_prng_seed() {
        let mut long = GOLDEN_SEED.to_vec();
        long.extend_from_slice(b"tail bytes that legacy mode drops");
        let config = small_config(SeedExpansion::Legacy);

        let a = derive_keypair(GOLDEN_SEED, &config).unwrap();
        let b = derive_keypair(&long, &config).unwrap();
        assert_eq!(a.n(), b.n());
    }

    #[test]
    fn hardened_uses_every_seed_byte() {
        let mut long = GOLDEN_SEED.to_vec();
        long.extend_from_slice(b"tail bytes that matter");
        let config = small_config(SeedExpansion::Hardened);

        let a = derive_keypair(GOLDEN_SEED, &config).unwrap();
        let b = derive_keypair(&long, &config).unwrap();
        assert_ne!(a.n(), b.n());
    }

    #[test]
    fn seed_debug_is_redacted() {
        let seed = Seed::new(b"super secret signature".to_vec());
        let rendered = format!("{seed:?}");
        assert_eq!(rendered, "Seed([REDACTED; 22 bytes])");
        assert!(!rendered.contains("secret"));
    }
}
