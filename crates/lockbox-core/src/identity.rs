//! Accounts and their derived identities.

use std::fmt;

use lockbox_crypto::{Envelope, EnvelopeError, PublicKeyHandle, RsaPrivateKey, open_envelope};

use crate::error::IdentityError;

/// Normalized account identifier (typically a wallet address).
///
/// Surrounding whitespace is trimmed; the result must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(String);

impl AccountId {
    /// Normalize and validate an account identifier.
    ///
    /// # Errors
    ///
    /// `InvalidAccount` if `raw` is empty or only whitespace.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, IdentityError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdentityError::InvalidAccount);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prepared local identity: the derived keypair of one account.
///
/// Lives only in memory. `Debug` omits the private key.
pub struct Identity {
    account: AccountId,
    private_key: RsaPrivateKey,
    handle: PublicKeyHandle,
}

impl Identity {
    /// Wrap a derived keypair.
    pub fn new(account: AccountId, private_key: RsaPrivateKey) -> Self {
        let handle = PublicKeyHandle::from_private_key(&private_key);
        Self { account, private_key, handle }
    }

    /// Account this identity belongs to.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Public key handle to publish to senders.
    pub fn handle(&self) -> &PublicKeyHandle {
        &self.handle
    }

    /// Open an envelope addressed to this identity.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        open_envelope(&self.private_key, envelope)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("account", &self.account)
            .field("handle", &self.handle.as_str())
            .finish_non_exhaustive()
    }
}
