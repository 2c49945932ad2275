//! Secure messaging facade.
//!
//! [`SecureMessenger`] owns the per-account identities of a session and
//! drives the primitives in `lockbox-crypto`:
//!
//! ```text
//! prepare_identity(msg, account)
//!     store.get(account) ──hit──────────────────────────┐
//!            └─miss─> signer.sign(msg) ─> store.set ────┤
//!                                                       v
//!                                  spawn_blocking(derive_keypair(seed))
//!                                                       v
//!                                         Identity { keypair, handle }
//!
//! encrypt_to_recipients(pt, handles) ─> one Envelope per handle
//! decrypt_envelope(account, env)     ─> Identity::open ─> plaintext | Failed
//! ```
//!
//! # Concurrency
//!
//! Each account has its own async slot. Concurrent `prepare_identity` calls
//! for one account serialize on it, so the signer is asked at most once.
//! Different accounts only share the short map lookup.
//!
//! If a `prepare_identity` future is dropped while waiting on the signer,
//! nothing has been written to the store and the slot stays empty.
//!
//! Store reads and writes may block (redb commits to disk), so they run on
//! the blocking pool like key derivation does.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use lockbox_crypto::{
    DerivationConfig, Envelope, PartialEncryptionError, PublicKeyHandle, Seed, derive_keypair,
};

use crate::{
    env::Environment,
    error::{DecryptError, IdentityError},
    identity::{AccountId, Identity},
    signer::SignatureSeedSource,
    store::KeyMaterialStore,
};

/// Messenger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessengerConfig {
    /// Keypair derivation parameters.
    pub derivation: DerivationConfig,

    /// How long to wait for the signer before giving up.
    pub sign_timeout: Duration,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self { derivation: DerivationConfig::default(), sign_timeout: Duration::from_secs(120) }
    }
}

/// Envelope to decrypt, tagged with a caller-chosen id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptRequest<I> {
    /// Echoed back in the matching [`DecryptOutcome`].
    pub id: I,
    /// Envelope to open.
    pub envelope: Envelope,
}

/// Result of one [`DecryptRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptOutcome<I> {
    /// Id of the originating request.
    pub id: I,
    /// Plaintext or failure.
    pub result: Result<Vec<u8>, DecryptError>,
}

type IdentitySlot = Arc<tokio::sync::Mutex<Option<Arc<Identity>>>>;

/// Per-session messaging facade.
pub struct SecureMessenger<E: Environment> {
    env: E,
    signer: Arc<dyn SignatureSeedSource>,
    store: Arc<dyn KeyMaterialStore>,
    config: MessengerConfig,
    identities: Mutex<HashMap<AccountId, IdentitySlot>>,
}

impl<E: Environment> SecureMessenger<E> {
    /// Create a messenger with no prepared identities.
    pub fn new(
        env: E,
        signer: Arc<dyn SignatureSeedSource>,
        store: Arc<dyn KeyMaterialStore>,
        config: MessengerConfig,
    ) -> Self {
        Self { env, signer, store, config, identities: Mutex::new(HashMap::new()) }
    }

    /// Active configuration.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// Make the local identity of `account` available for decryption.
    ///
    /// Uses the cached seed if the store has one; otherwise asks the signer
    /// to sign `sign_message`, persists the signature as the seed, and
    /// derives the keypair on a blocking thread. Calling this again for an
    /// account that is already prepared returns the same handle without
    /// touching the signer or the store.
    ///
    /// # Errors
    ///
    /// - `InvalidAccount` for a blank account
    /// - `Signer` / `SignerTimeout` / `EmptySignature` if no usable signature
    ///   was obtained (the store is left untouched)
    /// - `Store` if the seed cannot be read or persisted
    /// - `Derivation` / `TaskFailed` if key generation fails
    pub async fn prepare_identity(
        &self,
        sign_message: &str,
        account: &str,
    ) -> Result<PublicKeyHandle, IdentityError> {
        let account = AccountId::new(account)?;
        let slot = self.slot(&account);
        let mut prepared = slot.lock().await;

        if let Some(identity) = prepared.as_ref() {
            return Ok(identity.handle().clone());
        }

        let seed = if let Some(seed) = self.load_seed(&account).await? {
            tracing::debug!(%account, "using cached seed");
            seed
        } else {
            let seed = self.request_seed(sign_message, &account).await?;
            self.save_seed(&account, &seed).await?;
            seed
        };

        let identity = self.derive_identity(account, seed).await?;
        let handle = identity.handle().clone();
        tracing::info!(account = %identity.account(), "identity prepared");

        *prepared = Some(Arc::new(identity));
        Ok(handle)
    }

    /// Encrypt `plaintext` to every recipient handle.
    ///
    /// Does not require a prepared identity.
    ///
    /// # Errors
    ///
    /// `PartialEncryptionError` if any recipient failed; it still carries the
    /// envelopes of the recipients that succeeded.
    pub fn encrypt_to_recipients<S: AsRef<str>>(
        &self,
        plaintext: &[u8],
        recipients: &[S],
    ) -> Result<Vec<Envelope>, PartialEncryptionError> {
        let mut rng = self.env.rng();
        lockbox_crypto::encrypt_to_recipients(&mut rng, plaintext, recipients)
    }

    /// Decrypt an envelope addressed to the prepared identity of `account`.
    ///
    /// # Errors
    ///
    /// - `IdentityNotPrepared` if [`Self::prepare_identity`] has not
    ///   succeeded for `account`
    /// - `Failed` for any malformed, tampered or misaddressed envelope
    pub async fn decrypt_envelope(
        &self,
        account: &str,
        envelope: &Envelope,
    ) -> Result<Vec<u8>, DecryptError> {
        let identity = self.require_identity(account).await?;
        open(&identity, envelope)
    }

    /// Decrypt several envelopes for one account.
    ///
    /// Outcomes come back in request order, each tagged with its request id.
    /// One failing envelope does not affect the others.
    pub async fn decrypt_batch<I>(
        &self,
        account: &str,
        requests: Vec<DecryptRequest<I>>,
    ) -> Vec<DecryptOutcome<I>> {
        match self.require_identity(account).await {
            Ok(identity) => requests
                .into_iter()
                .map(|request| DecryptOutcome {
                    result: open(&identity, &request.envelope),
                    id: request.id,
                })
                .collect(),
            Err(error) => requests
                .into_iter()
                .map(|request| DecryptOutcome { id: request.id, result: Err(error.clone()) })
                .collect(),
        }
    }

    /// Handle of the prepared identity of `account`, if any.
    pub async fn public_handle(&self, account: &str) -> Option<PublicKeyHandle> {
        let identity = self.identity(account).await?;
        Some(identity.handle().clone())
    }

    /// Drop the in-memory identity of `account`.
    ///
    /// The cached seed stays in the store, so a later
    /// [`Self::prepare_identity`] re-derives the same keypair without the
    /// signer. Returns true if an identity was prepared.
    ///
    /// The account's slot stays in place: a forget that races an in-flight
    /// prepare waits for it on the same slot, and later prepares find the
    /// seed it stored.
    pub async fn forget_identity(&self, account: &str) -> bool {
        let Ok(account) = AccountId::new(account) else {
            return false;
        };
        let slot = {
            let identities = self.identities.lock().unwrap_or_else(PoisonError::into_inner);
            identities.get(&account).map(Arc::clone)
        };
        let Some(slot) = slot else {
            return false;
        };

        let forgotten = slot.lock().await.take().is_some();
        if forgotten {
            tracing::info!(%account, "identity forgotten");
        }
        forgotten
    }

    fn slot(&self, account: &AccountId) -> IdentitySlot {
        let mut identities = self.identities.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(identities.entry(account.clone()).or_default())
    }

    async fn identity(&self, account: &str) -> Option<Arc<Identity>> {
        let account = AccountId::new(account).ok()?;
        let slot = {
            let identities = self.identities.lock().unwrap_or_else(PoisonError::into_inner);
            identities.get(&account).map(Arc::clone)
        }?;
        slot.lock().await.clone()
    }

    async fn require_identity(&self, account: &str) -> Result<Arc<Identity>, DecryptError> {
        self.identity(account)
            .await
            .ok_or_else(|| DecryptError::IdentityNotPrepared { account: account.trim().to_owned() })
    }

    async fn load_seed(&self, account: &AccountId) -> Result<Option<Seed>, IdentityError> {
        let store = Arc::clone(&self.store);
        let account = account.clone();
        let seed = tokio::task::spawn_blocking(move || store.get(&account))
            .await
            .map_err(|e| IdentityError::TaskFailed { reason: e.to_string() })??;
        Ok(seed)
    }

    async fn save_seed(&self, account: &AccountId, seed: &Seed) -> Result<(), IdentityError> {
        let store = Arc::clone(&self.store);
        let account = account.clone();
        let seed = seed.clone();
        tokio::task::spawn_blocking(move || store.set(&account, &seed))
            .await
            .map_err(|e| IdentityError::TaskFailed { reason: e.to_string() })??;
        Ok(())
    }

    async fn request_seed(
        &self,
        sign_message: &str,
        account: &AccountId,
    ) -> Result<Seed, IdentityError> {
        let timeout = self.config.sign_timeout;
        tracing::debug!(%account, "requesting signature");

        let signature = tokio::time::timeout(timeout, self.signer.sign(sign_message, account))
            .await
            .map_err(|_| {
                tracing::warn!(%account, ?timeout, "signer timed out");
                IdentityError::SignerTimeout { after: timeout }
            })??;

        if signature.is_empty() {
            return Err(IdentityError::EmptySignature);
        }
        Ok(Seed::new(signature))
    }

    async fn derive_identity(&self, account: AccountId, seed: Seed) -> Result<Identity, IdentityError> {
        let config = self.config.derivation;
        let key = tokio::task::spawn_blocking(move || derive_keypair(seed.as_bytes(), &config))
            .await
            .map_err(|e| IdentityError::TaskFailed { reason: e.to_string() })??;

        Ok(Identity::new(account, key))
    }
}

fn open(identity: &Identity, envelope: &Envelope) -> Result<Vec<u8>, DecryptError> {
    identity.open(envelope).map_err(|error| {
        tracing::debug!(account = %identity.account(), %error, "envelope rejected");
        DecryptError::Failed
    })
}
