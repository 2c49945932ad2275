//! Lockbox command line front-end.
//!
//! Thin wiring between files on disk and [`SecureMessenger`]. Encryption
//! needs no identity and calls `lockbox-crypto` directly. The wallet
//! prompt happens outside this program: the signature is passed in as hex
//! and served by a [`StaticSigner`]. Once a seed is cached in the store,
//! later invocations need no signature at all.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use lockbox_core::{
    DecryptError, DerivationConfig, Envelope, Environment, IdentityError, MessengerConfig,
    PublicKeyHandle, RedbKeyStore, SecureMessenger, SeedExpansion, StaticSigner, StoreError,
    SystemEnv,
};
use lockbox_crypto::{EnvelopeError, RecipientFailure, encrypt_to_recipients};
use thiserror::Error;

/// Message signed by the wallet when none is given.
pub const DEFAULT_SIGN_MESSAGE: &str = "Sign this message to derive your Lockbox messaging key.";

/// Errors surfaced to the command line.
#[derive(Debug, Error)]
pub enum CliError {
    /// File could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// `--signature-hex` is not valid hex.
    #[error("invalid signature hex: {0}")]
    SignatureHex(#[from] hex::FromHexError),

    /// Key store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity could not be prepared.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Envelope file is malformed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Envelope could not be decrypted.
    #[error(transparent)]
    Decrypt(#[from] DecryptError),
}

/// Where the local identity comes from.
#[derive(Debug, Clone)]
pub struct IdentitySource {
    /// Seed store path.
    pub store: PathBuf,
    /// Account (wallet address).
    pub account: String,
    /// Out-of-band wallet signature, hex encoded (optional `0x` prefix).
    pub signature_hex: Option<String>,
    /// Message the signature was made over.
    pub sign_message: String,
    /// Seed expansion mode.
    pub seed_expansion: SeedExpansion,
}

/// Result of [`encrypt`].
#[derive(Debug)]
pub struct EncryptReport {
    /// Envelope files written, in recipient order.
    pub written: Vec<PathBuf>,
    /// Recipients that could not be encrypted to.
    pub failures: Vec<RecipientFailure>,
}

/// Prepare the identity and return its public key handle.
pub async fn identity(source: &IdentitySource) -> Result<PublicKeyHandle, CliError> {
    let messenger = open_messenger(source)?;
    let handle = messenger.prepare_identity(&source.sign_message, &source.account).await?;
    Ok(handle)
}

/// Encrypt the file at `input` to every recipient, writing
/// `envelope-<index>.cbor` into `output_dir` for each success.
pub fn encrypt(
    recipients: &[String],
    input: &Path,
    output_dir: &Path,
) -> Result<EncryptReport, CliError> {
    let plaintext = read(input)?;
    fs::create_dir_all(output_dir).map_err(|source| io_error(output_dir, source))?;

    let mut rng = SystemEnv::new().rng();
    let (envelopes, failures) = match encrypt_to_recipients(&mut rng, &plaintext, recipients) {
        Ok(envelopes) => (envelopes.into_iter().enumerate().collect(), Vec::new()),
        Err(partial) => (partial.envelopes, partial.failures),
    };

    let mut written = Vec::with_capacity(envelopes.len());
    for (index, envelope) in envelopes {
        let path = output_dir.join(format!("envelope-{index}.cbor"));
        write(&path, &envelope.to_cbor()?)?;
        written.push(path);
    }

    tracing::info!(written = written.len(), failed = failures.len(), "encryption finished");
    Ok(EncryptReport { written, failures })
}

/// Decrypt the envelope file at `input` with the identity of `source`.
pub async fn decrypt(source: &IdentitySource, input: &Path) -> Result<Vec<u8>, CliError> {
    let envelope = Envelope::from_cbor(&read(input)?)?;

    let messenger = open_messenger(source)?;
    messenger.prepare_identity(&source.sign_message, &source.account).await?;
    let plaintext = messenger.decrypt_envelope(&source.account, &envelope).await?;
    Ok(plaintext)
}

fn open_messenger(source: &IdentitySource) -> Result<SecureMessenger<SystemEnv>, CliError> {
    let signer = match &source.signature_hex {
        Some(signature) => {
            let digits = signature.strip_prefix("0x").unwrap_or(signature);
            StaticSigner::new(hex::decode(digits)?)
        },
        None => StaticSigner::unavailable(),
    };
    let store = RedbKeyStore::open(&source.store)?;

    let config = MessengerConfig {
        derivation: DerivationConfig {
            seed_expansion: source.seed_expansion,
            ..DerivationConfig::default()
        },
        ..MessengerConfig::default()
    };
    Ok(SecureMessenger::new(SystemEnv::new(), Arc::new(signer), Arc::new(store), config))
}

fn read(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| io_error(path, source))
}

/// Write `bytes` to `path`.
pub fn write(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    fs::write(path, bytes).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> CliError {
    CliError::Io { path: path.to_path_buf(), source }
}
