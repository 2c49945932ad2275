//! Lockbox Cryptographic Primitives
//!
//! This crate provides the cryptographic building blocks for wallet-derived
//! end-to-end encrypted messaging.
//!
//! # Design
//!
//! Every function in this crate is free of I/O. Key derivation is a pure
//! function of its seed, and random bytes required for encapsulation or
//! encryption are drawn from a caller-provided RNG, enabling:
//!
//! - Deterministic testing with seeded RNG
//! - Sans-IO architecture compatibility
//! - No coupling to application-level abstractions
//!
//! # Scheme
//!
//! ```text
//! seed ──expand──> ChaCha20 PRNG ──prime search──> RSA keypair
//!
//! plaintext ─┬─> [RSA-KEM(pub_0) -> k_0] ─> AES-128-GCM(k_0) ─> Envelope_0
//!            ├─> [RSA-KEM(pub_1) -> k_1] ─> AES-128-GCM(k_1) ─> Envelope_1
//!            └─> ...
//! ```
//!
//! # Security Properties
//!
//! - Recipient isolation: every envelope has its own session key and IV
//! - Integrity: GCM tags are verified before any plaintext is released
//! - Stable identity: the same seed always yields the same keypair

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cipher;
pub mod derivation;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod kem;

pub use cipher::{IV_SIZE, SESSION_KEY_SIZE, Sealed, TAG_SIZE};
pub use derivation::{
    DEFAULT_MODULUS_BITS, DerivationConfig, MAX_MODULUS_BITS, MIN_MODULUS_BITS, Seed,
    SeedExpansion, derive_keypair, expand_seed,
};
pub use envelope::{Envelope, encrypt_to_recipients, open_envelope};
pub use error::{
    CipherError, DerivationError, EnvelopeError, HandleError, KemError, PartialEncryptionError,
    RecipientFailure,
};
pub use handle::{PUBLIC_EXPONENT, PublicKeyHandle};
pub use kem::{Encapsulated, MAX_KDF_OUTPUT, SessionKey, decapsulate, encapsulate};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
