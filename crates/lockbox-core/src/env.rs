//! Environment abstraction for randomness.
//!
//! The messenger never touches a global RNG. Every random byte it consumes
//! (KEM secrets, IVs) is drawn through an [`Environment`], so production uses
//! OS entropy while tests inject a seeded source and get reproducible
//! envelopes.
//!
//! # Invariants
//!
//! - Determinism: given the same seed, a test environment produces the same
//!   byte sequence
//! - Isolation: implementations must not share global state

use rand::{RngCore, SeedableRng, rngs::OsRng};
use rand_chacha::ChaCha20Rng;

/// Abstract source of randomness.
///
/// # Security
///
/// Production implementations MUST draw from a cryptographically secure
/// source (OS entropy). `rand::thread_rng()` is not acceptable here.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fresh CSPRNG for one operation, keyed from [`Self::random_bytes`].
    fn rng(&self) -> ChaCha20Rng {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed);
        ChaCha20Rng::from_seed(seed)
    }
}

/// Production environment backed by the operating system's entropy pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        OsRng.fill_bytes(buffer);
    }
}
