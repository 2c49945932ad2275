//! Error types for the messaging facade and its collaborators.

use std::time::Duration;

use lockbox_crypto::DerivationError;
use thiserror::Error;

/// Errors reported by a [`crate::SignatureSeedSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// The account holder declined to sign.
    #[error("signature request rejected: {reason}")]
    Rejected {
        /// Reason reported by the signer.
        reason: String,
    },

    /// The signer could not be reached or has nothing to sign with.
    #[error("signer unavailable: {reason}")]
    Unavailable {
        /// Reason reported by the signer.
        reason: String,
    },
}

/// Errors reported by a [`crate::KeyMaterialStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("key store backend: {reason}")]
    Backend {
        /// Backend error description.
        reason: String,
    },
}

/// Errors from preparing a local identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Account identifier is empty after trimming.
    #[error("invalid account identifier")]
    InvalidAccount,

    /// Signer refused or failed.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Signer did not answer within the configured timeout.
    #[error("signer did not respond within {after:?}")]
    SignerTimeout {
        /// Configured timeout.
        after: Duration,
    },

    /// Signer answered with zero bytes.
    #[error("signer returned an empty signature")]
    EmptySignature,

    /// Seed could not be read from or written to the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Keypair derivation failed.
    #[error("key derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// Background key generation task panicked or was cancelled.
    #[error("key generation task failed: {reason}")]
    TaskFailed {
        /// Join error description.
        reason: String,
    },
}

impl IdentityError {
    /// Returns true if retrying `prepare_identity` may succeed.
    ///
    /// Signer and store failures are transient; derivation and account
    /// errors are deterministic and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Signer(_) | Self::SignerTimeout { .. } | Self::EmptySignature | Self::Store(_)
        )
    }
}

/// Errors from decrypting an envelope at the facade.
///
/// Decapsulation and authentication failures are deliberately collapsed into
/// [`DecryptError::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    /// No identity has been prepared for this account in this session.
    #[error("no identity prepared for account {account}")]
    IdentityNotPrepared {
        /// Account the caller asked for.
        account: String,
    },

    /// The envelope could not be opened.
    #[error("decryption failed")]
    Failed,
}
