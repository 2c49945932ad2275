//! SecureMessenger tests
//!
//! End-to-end behavior of the facade: identity preparation against scripted
//! signers and stores, then encryption and decryption between accounts.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    time::Duration,
};

use async_trait::async_trait;
use lockbox_core::{
    AccountId, DecryptError, DecryptRequest, DerivationConfig, Environment, IdentityError,
    KeyMaterialStore, MemoryKeyStore, MessengerConfig, RedbKeyStore, SecureMessenger, Seed,
    SignatureSeedSource, SignerError, StaticSigner, StoreError, SystemEnv,
};
use lockbox_crypto::{EnvelopeError, HandleError, PublicKeyHandle, derive_keypair};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const SIGN_MESSAGE: &str = "Sign to unlock your Lockbox messages";

// Seeded environment for reproducible envelopes
#[derive(Clone)]
struct SeededEnv(Arc<Mutex<ChaCha20Rng>>);

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))))
    }
}

impl Environment for SeededEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.0.lock().unwrap().fill_bytes(buffer);
    }
}

/// Signs deterministically per (message, account) and counts requests.
#[derive(Default)]
struct CountingSigner {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingSigner {
    fn with_delay(delay: Duration) -> Self {
        Self { calls: AtomicUsize::new(0), delay }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignatureSeedSource for CountingSigner {
    async fn sign(&self, message: &str, account: &AccountId) -> Result<Vec<u8>, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(format!("signature:{message}:{account}").into_bytes())
    }
}

/// Never answers, like a wallet prompt left open.
struct PendingSigner;

#[async_trait]
impl SignatureSeedSource for PendingSigner {
    async fn sign(&self, _message: &str, _account: &AccountId) -> Result<Vec<u8>, SignerError> {
        std::future::pending().await
    }
}

/// Store that reads fine but refuses writes.
#[derive(Default)]
struct ReadOnlyStore;

impl KeyMaterialStore for ReadOnlyStore {
    fn get(&self, _account: &AccountId) -> Result<Option<Seed>, StoreError> {
        Ok(None)
    }

    fn set(&self, _account: &AccountId, _seed: &Seed) -> Result<(), StoreError> {
        Err(StoreError::Backend { reason: "read-only".into() })
    }

    fn remove(&self, _account: &AccountId) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Store whose reads block the calling thread until the test opens the gate.
struct GatedStore {
    gate: Mutex<mpsc::Receiver<()>>,
    inner: MemoryKeyStore,
}

impl KeyMaterialStore for GatedStore {
    fn get(&self, account: &AccountId) -> Result<Option<Seed>, StoreError> {
        self.gate
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| StoreError::Backend { reason: "gate never opened".into() })?;
        self.inner.get(account)
    }

    fn set(&self, account: &AccountId, seed: &Seed) -> Result<(), StoreError> {
        self.inner.set(account, seed)
    }

    fn remove(&self, account: &AccountId) -> Result<bool, StoreError> {
        self.inner.remove(account)
    }
}

fn fast_config() -> MessengerConfig {
    MessengerConfig {
        derivation: DerivationConfig { modulus_bits: 512, ..DerivationConfig::default() },
        sign_timeout: Duration::from_secs(5),
    }
}

fn messenger_with(
    signer: Arc<dyn SignatureSeedSource>,
    store: Arc<dyn KeyMaterialStore>,
) -> SecureMessenger<SystemEnv> {
    SecureMessenger::new(SystemEnv::new(), signer, store, fast_config())
}

fn account(name: &str) -> AccountId {
    AccountId::new(name).unwrap()
}

#[tokio::test]
async fn signing_path_and_cached_path_yield_same_identity() {
    let signer = Arc::new(CountingSigner::default());
    let store = Arc::new(MemoryKeyStore::new());
    let fresh = messenger_with(signer.clone(), store.clone());

    let signed = fresh.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    assert_eq!(signer.calls(), 1);
    assert!(store.get(&account("alice")).unwrap().is_some());

    // New session over the populated store must not prompt again
    let cached_signer = Arc::new(CountingSigner::default());
    let cached = messenger_with(cached_signer.clone(), store);
    let from_cache = cached.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();

    assert_eq!(from_cache, signed);
    assert_eq!(cached_signer.calls(), 0);
}

#[tokio::test]
async fn handle_matches_direct_derivation() {
    let messenger = messenger_with(
        Arc::new(StaticSigner::new(b"wallet-signature".to_vec())),
        Arc::new(MemoryKeyStore::new()),
    );
    let handle = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();

    let key = derive_keypair(b"wallet-signature", &fast_config().derivation).unwrap();
    assert_eq!(handle.to_public_key().unwrap(), key.to_public_key());
    assert_eq!(handle, PublicKeyHandle::from_private_key(&key));
}

#[tokio::test]
async fn accounts_get_distinct_identities() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));

    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    let bob = messenger.prepare_identity(SIGN_MESSAGE, "bob").await.unwrap();
    assert_ne!(alice, bob);
}

#[tokio::test]
async fn round_trip_between_accounts() {
    let alice_side =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let bob_side =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));

    let alice = alice_side.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();

    let envelopes = bob_side.encrypt_to_recipients(b"hello alice", &[alice]).unwrap();
    assert_eq!(envelopes.len(), 1);

    let plaintext = alice_side.decrypt_envelope("alice", &envelopes[0]).await.unwrap();
    assert_eq!(plaintext, b"hello alice");
}

#[tokio::test]
async fn tampered_envelopes_fail_opaquely() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    let envelope = messenger.encrypt_to_recipients(b"do not touch", &[alice]).unwrap().remove(0);

    let mut bad = envelope.clone();
    bad.ciphertext[3] ^= 0x01;
    assert_eq!(messenger.decrypt_envelope("alice", &bad).await, Err(DecryptError::Failed));

    let mut bad = envelope.clone();
    bad.tag[0] ^= 0x80;
    assert_eq!(messenger.decrypt_envelope("alice", &bad).await, Err(DecryptError::Failed));

    let mut bad = envelope.clone();
    bad.encapsulation.pop();
    assert_eq!(messenger.decrypt_envelope("alice", &bad).await, Err(DecryptError::Failed));

    let mut bad = envelope;
    bad.encapsulation = vec![0xff; bad.encapsulation.len()];
    assert_eq!(messenger.decrypt_envelope("alice", &bad).await, Err(DecryptError::Failed));
}

#[tokio::test]
async fn misaddressed_envelope_fails() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    messenger.prepare_identity(SIGN_MESSAGE, "bob").await.unwrap();

    let envelope = messenger.encrypt_to_recipients(b"for alice", &[alice]).unwrap().remove(0);
    assert_eq!(messenger.decrypt_envelope("bob", &envelope).await, Err(DecryptError::Failed));
}

#[tokio::test]
async fn malformed_recipient_does_not_block_others() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    let bob = messenger.prepare_identity(SIGN_MESSAGE, "bob").await.unwrap();

    let recipients = [alice.to_string(), "0xdeadbeef".to_string(), bob.to_string()];
    let err = messenger.encrypt_to_recipients(b"group note", &recipients).unwrap_err();

    assert_eq!(err.failed_indexes(), vec![1]);
    assert_eq!(err.failures[0].error, EnvelopeError::Handle(HandleError::Prefixed));

    let to_alice = err.envelope_for(0).unwrap();
    let to_bob = err.envelope_for(2).unwrap();
    assert_eq!(messenger.decrypt_envelope("alice", to_alice).await.unwrap(), b"group note");
    assert_eq!(messenger.decrypt_envelope("bob", to_bob).await.unwrap(), b"group note");
}

#[tokio::test]
async fn signer_timeout_leaves_store_empty() {
    let store = Arc::new(MemoryKeyStore::new());
    let config =
        MessengerConfig { sign_timeout: Duration::from_millis(50), ..fast_config() };
    let messenger =
        SecureMessenger::new(SystemEnv::new(), Arc::new(PendingSigner), store.clone(), config);

    let result = messenger.prepare_identity(SIGN_MESSAGE, "alice").await;
    assert_eq!(result, Err(IdentityError::SignerTimeout { after: Duration::from_millis(50) }));
    assert!(result.unwrap_err().is_retryable());
    assert!(store.is_empty());
    assert!(messenger.public_handle("alice").await.is_none());
}

#[tokio::test]
async fn empty_signature_is_rejected() {
    let store = Arc::new(MemoryKeyStore::new());
    let messenger = messenger_with(Arc::new(StaticSigner::new(Vec::new())), store.clone());

    let result = messenger.prepare_identity(SIGN_MESSAGE, "alice").await;
    assert_eq!(result, Err(IdentityError::EmptySignature));
    assert!(store.is_empty());
}

#[tokio::test]
async fn signer_failure_is_propagated() {
    let store = Arc::new(MemoryKeyStore::new());
    let messenger = messenger_with(Arc::new(StaticSigner::unavailable()), store.clone());

    let err = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap_err();
    assert!(matches!(err, IdentityError::Signer(SignerError::Unavailable { .. })));
    assert!(err.is_retryable());
    assert!(store.is_empty());
}

#[tokio::test]
async fn store_write_failure_aborts_preparation() {
    let messenger = messenger_with(Arc::new(CountingSigner::default()), Arc::new(ReadOnlyStore));

    let err = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap_err();
    assert_eq!(err, IdentityError::Store(StoreError::Backend { reason: "read-only".into() }));
    assert!(messenger.public_handle("alice").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_prepares_sign_once() {
    let signer = Arc::new(CountingSigner::with_delay(Duration::from_millis(50)));
    let messenger =
        Arc::new(messenger_with(signer.clone(), Arc::new(MemoryKeyStore::new())));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let messenger = Arc::clone(&messenger);
            tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "alice").await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(signer.calls(), 1);
    assert!(handles.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forget_during_prepare_does_not_sign_twice() {
    let signer = Arc::new(CountingSigner::with_delay(Duration::from_millis(200)));
    let store = Arc::new(MemoryKeyStore::new());
    let messenger = Arc::new(messenger_with(signer.clone(), store.clone()));

    let first = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "alice").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let forget = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.forget_identity("alice").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "alice").await })
    };

    let first = first.await.unwrap().unwrap();
    assert!(forget.await.unwrap());
    let second = second.await.unwrap().unwrap();

    assert_eq!(signer.calls(), 1);
    assert_eq!(first, second);
    assert!(store.get(&account("alice")).unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_accounts_prepare_concurrently() {
    let signer = Arc::new(CountingSigner::with_delay(Duration::from_millis(20)));
    let messenger =
        Arc::new(messenger_with(signer.clone(), Arc::new(MemoryKeyStore::new())));

    let alice = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "alice").await })
    };
    let bob = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "bob").await })
    };

    let alice = alice.await.unwrap().unwrap();
    let bob = bob.await.unwrap().unwrap();
    assert_ne!(alice, bob);
    assert_eq!(signer.calls(), 2);
}

#[tokio::test]
async fn blocking_store_does_not_stall_the_runtime() {
    let (open_gate, gate) = mpsc::channel();
    let store = Arc::new(GatedStore { gate: Mutex::new(gate), inner: MemoryKeyStore::new() });
    let messenger = Arc::new(messenger_with(Arc::new(CountingSigner::default()), store));

    let prepare = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move { messenger.prepare_identity(SIGN_MESSAGE, "alice").await })
    };

    // Only reachable while the store read is parked off this thread
    tokio::time::sleep(Duration::from_millis(20)).await;
    open_gate.send(()).unwrap();

    assert!(prepare.await.unwrap().is_ok());
}

#[tokio::test]
async fn batch_decrypt_echoes_ids() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();

    let first = messenger.encrypt_to_recipients(b"one", &[&alice]).unwrap().remove(0);
    let mut second = messenger.encrypt_to_recipients(b"two", &[&alice]).unwrap().remove(0);
    second.tag[5] ^= 1;
    let third = messenger.encrypt_to_recipients(b"three", &[&alice]).unwrap().remove(0);

    let requests = vec![
        DecryptRequest { id: "m1", envelope: first },
        DecryptRequest { id: "m2", envelope: second },
        DecryptRequest { id: "m3", envelope: third },
    ];
    let outcomes = messenger.decrypt_batch("alice", requests).await;

    let ids: Vec<_> = outcomes.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert_eq!(outcomes[0].result, Ok(b"one".to_vec()));
    assert_eq!(outcomes[1].result, Err(DecryptError::Failed));
    assert_eq!(outcomes[2].result, Ok(b"three".to_vec()));
}

#[tokio::test]
async fn batch_decrypt_without_identity() {
    let messenger =
        messenger_with(Arc::new(CountingSigner::default()), Arc::new(MemoryKeyStore::new()));
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    let envelope = messenger.encrypt_to_recipients(b"x", &[alice]).unwrap().remove(0);

    let outcomes =
        messenger.decrypt_batch("carol", vec![DecryptRequest { id: 7u64, envelope }]).await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].id, 7);
    assert_eq!(
        outcomes[0].result,
        Err(DecryptError::IdentityNotPrepared { account: "carol".into() })
    );
}

#[tokio::test]
async fn seeded_environment_reproduces_envelopes() {
    let key = derive_keypair(b"recipient", &fast_config().derivation).unwrap();
    let recipient = PublicKeyHandle::from_private_key(&key);

    let encrypt = |seed| {
        let messenger = SecureMessenger::new(
            SeededEnv::new(seed),
            Arc::new(StaticSigner::unavailable()),
            Arc::new(MemoryKeyStore::new()),
            fast_config(),
        );
        messenger.encrypt_to_recipients(b"reproducible", &[&recipient]).unwrap()
    };

    assert_eq!(encrypt(9), encrypt(9));
    assert_ne!(encrypt(9), encrypt(10));
}

#[tokio::test]
async fn redb_store_keeps_identity_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lockbox.redb");

    let first = {
        let store = Arc::new(RedbKeyStore::open(&path).unwrap());
        let messenger = messenger_with(Arc::new(CountingSigner::default()), store);
        messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap()
    };

    let store = Arc::new(RedbKeyStore::open(&path).unwrap());
    let messenger = messenger_with(Arc::new(StaticSigner::unavailable()), store);
    let second = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn default_modulus_identity_round_trips() {
    let messenger = SecureMessenger::new(
        SystemEnv::new(),
        Arc::new(CountingSigner::default()),
        Arc::new(MemoryKeyStore::new()),
        MessengerConfig::default(),
    );
    let alice = messenger.prepare_identity(SIGN_MESSAGE, "alice").await.unwrap();
    assert_eq!(alice.as_str().len(), 256);

    let envelope = messenger.encrypt_to_recipients(b"full size", &[alice]).unwrap().remove(0);
    assert_eq!(envelope.encapsulation.len(), 128);
    assert_eq!(messenger.decrypt_envelope("alice", &envelope).await.unwrap(), b"full size");
}
