//! Lockbox secure messaging core
//!
//! Session-level orchestration on top of `lockbox-crypto`: turning a wallet
//! signature into a stable per-account identity, and encrypting/decrypting
//! envelopes with it.
//!
//! # Architecture
//!
//! External effects reach the messenger only through explicit
//! collaborators:
//!
//! - a [`SignatureSeedSource`] that signs a message for an account (the
//!   wallet)
//! - a [`KeyMaterialStore`] that caches the resulting seed
//! - an [`Environment`] that supplies randomness
//!
//! Production wires in the real wallet, [`RedbKeyStore`] and [`SystemEnv`];
//! tests swap in scripted signers, [`MemoryKeyStore`] and seeded
//! environments.
//!
//! # Components
//!
//! - [`messenger`]: The [`SecureMessenger`] facade
//! - [`identity`]: Account identifiers and prepared identities
//! - [`signer`]: Signature seed source trait
//! - [`store`]: Key material store trait and implementations
//! - [`mod@env`]: Environment abstraction (RNG)
//! - [`error`]: Facade error types

pub mod env;
pub mod error;
pub mod identity;
pub mod messenger;
pub mod signer;
pub mod store;

pub use env::{Environment, SystemEnv};
pub use error::{DecryptError, IdentityError, SignerError, StoreError};
pub use identity::{AccountId, Identity};
pub use lockbox_crypto::{
    DerivationConfig, Envelope, PartialEncryptionError, PublicKeyHandle, Seed, SeedExpansion,
};
pub use messenger::{DecryptOutcome, DecryptRequest, MessengerConfig, SecureMessenger};
pub use signer::{SignatureSeedSource, StaticSigner};
pub use store::{KeyMaterialStore, MemoryKeyStore, RedbKeyStore};
