//! Signature seed source: the wallet collaborator.
//!
//! The messenger asks the signer to sign a fixed message for an account and
//! uses the raw signature bytes as that account's seed. Signatures are never
//! verified here; a signer that answers differently for the same message
//! simply yields a different identity.

use async_trait::async_trait;
use lockbox_crypto::Seed;

use crate::{error::SignerError, identity::AccountId};

/// Produces the secret seed for an account by signing a message.
///
/// Implementations may take arbitrarily long (a human approving a wallet
/// prompt); the messenger bounds the wait with its own timeout.
#[async_trait]
pub trait SignatureSeedSource: Send + Sync {
    /// Sign `message` with the key of `account`.
    async fn sign(&self, message: &str, account: &AccountId) -> Result<Vec<u8>, SignerError>;
}

/// Signer that answers every request with a signature obtained out of band.
///
/// Used by the command line front-end, where the wallet prompt happens
/// elsewhere and the signature is pasted in.
#[derive(Debug, Clone)]
pub struct StaticSigner {
    signature: Option<Seed>,
}

impl StaticSigner {
    /// Signer that always returns `signature`.
    pub fn new(signature: Vec<u8>) -> Self {
        Self { signature: Some(Seed::new(signature)) }
    }

    /// Signer with no signature; every request fails as unavailable.
    pub fn unavailable() -> Self {
        Self { signature: None }
    }
}

#[async_trait]
impl SignatureSeedSource for StaticSigner {
    async fn sign(&self, _message: &str, account: &AccountId) -> Result<Vec<u8>, SignerError> {
        match &self.signature {
            Some(signature) => Ok(signature.as_bytes().to_vec()),
            None => Err(SignerError::Unavailable {
                reason: format!("no signature supplied for {account}"),
            }),
        }
    }
}
