//! Per-recipient envelopes and multi-recipient encryption.
//!
//! Each recipient gets an independent envelope: its own RSA-KEM
//! encapsulation, its own AES-128 session key and its own IV. Nothing is
//! shared between envelopes except the plaintext they decrypt to.
//!
//! # Wire Format
//!
//! Envelopes travel as a CBOR map keyed by field name. Each field is a CBOR
//! array of unsigned integers, one per byte (the plain serde encoding of
//! `Vec<u8>` and `[u8; N]`):
//!
//! ```text
//! { "encapsulation": [u8; k], "iv": [u8; 12], "tag": [u8; 16], "ciphertext": [u8; len(pt)] }
//! ```

use rand::{CryptoRng, RngCore};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    cipher::{self, IV_SIZE, SESSION_KEY_SIZE, TAG_SIZE},
    error::{EnvelopeError, PartialEncryptionError, RecipientFailure},
    handle::PublicKeyHandle,
    kem,
};

/// Everything one recipient needs to recover the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// RSA-KEM encapsulation of the session key (modulus-sized).
    pub encapsulation: Vec<u8>,

    /// AES-GCM initialization vector.
    pub iv: [u8; IV_SIZE],

    /// AES-GCM authentication tag.
    pub tag: [u8; TAG_SIZE],

    /// AES-GCM ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encrypt `plaintext` for a single recipient key.
    ///
    /// # Errors
    ///
    /// Propagates KEM and cipher failures.
    pub fn seal<R: RngCore + CryptoRng + ?Sized>(
        rng: &mut R,
        recipient: &RsaPublicKey,
        plaintext: &[u8],
    ) -> Result<Self, EnvelopeError> {
        let encapsulated = kem::encapsulate(rng, recipient, SESSION_KEY_SIZE)?;
        let key = session_key_bytes(encapsulated.key.as_bytes());
        let sealed = cipher::encrypt(rng, &key, plaintext)?;

        Ok(Self {
            encapsulation: encapsulated.encapsulation,
            iv: sealed.iv,
            tag: sealed.tag,
            ciphertext: sealed.ciphertext,
        })
    }

    /// Serialize to CBOR.
    ///
    /// # Errors
    ///
    /// `Encode` if the serializer fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| EnvelopeError::Encode { reason: e.to_string() })?;
        Ok(bytes)
    }

    /// Deserialize from CBOR.
    ///
    /// # Errors
    ///
    /// `Decode` if the bytes are not a well-formed envelope.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        ciborium::de::from_reader(bytes).map_err(|e| EnvelopeError::Decode { reason: e.to_string() })
    }
}

/// Encrypt `plaintext` once per recipient handle.
///
/// Recipients are processed independently: a malformed handle or failed
/// encapsulation at one index never affects the envelopes of the others.
/// On full success the envelopes come back in input order. An empty
/// recipient list yields an empty vector.
///
/// # Errors
///
/// `PartialEncryptionError` if any recipient failed. It carries every
/// envelope that was produced, keyed by input index.
pub fn encrypt_to_recipients<R, S>(
    rng: &mut R,
    plaintext: &[u8],
    recipients: &[S],
) -> Result<Vec<Envelope>, PartialEncryptionError>
where
    R: RngCore + CryptoRng + ?Sized,
    S: AsRef<str>,
{
    let mut envelopes = Vec::with_capacity(recipients.len());
    let mut failures = Vec::new();

    for (index, recipient) in recipients.iter().enumerate() {
        match seal_for_handle(rng, recipient.as_ref(), plaintext) {
            Ok(envelope) => envelopes.push((index, envelope)),
            Err(error) => {
                tracing::warn!(index, %error, "recipient encryption failed");
                failures.push(RecipientFailure { index, error });
            },
        }
    }

    tracing::debug!(
        recipients = recipients.len(),
        failed = failures.len(),
        plaintext_len = plaintext.len(),
        "encrypted to recipients"
    );

    if failures.is_empty() {
        Ok(envelopes.into_iter().map(|(_, envelope)| envelope).collect())
    } else {
        Err(PartialEncryptionError { envelopes, failures })
    }
}

/// Recover the plaintext of an envelope addressed to `private_key`.
///
/// # Errors
///
/// - `Kem` if the encapsulation is malformed for this key
/// - `Cipher(AuthFailure)` if the tag does not verify, which includes
///   envelopes addressed to a different key
pub fn open_envelope(
    private_key: &RsaPrivateKey,
    envelope: &Envelope,
) -> Result<Vec<u8>, EnvelopeError> {
    let session = kem::decapsulate(private_key, &envelope.encapsulation, SESSION_KEY_SIZE)?;
    let key = session_key_bytes(session.as_bytes());
    let plaintext = cipher::decrypt(&key, &envelope.iv, &envelope.tag, &envelope.ciphertext)?;
    Ok(plaintext)
}

fn seal_for_handle<R: RngCore + CryptoRng + ?Sized>(
    rng: &mut R,
    handle: &str,
    plaintext: &[u8],
) -> Result<Envelope, EnvelopeError> {
    let (_, public_key) = PublicKeyHandle::parse_with_key(handle)?;
    Envelope::seal(rng, &public_key, plaintext)
}

/// `bytes` is always `SESSION_KEY_SIZE` long; the KEM is asked for exactly that.
fn session_key_bytes(bytes: &[u8]) -> Zeroizing<[u8; SESSION_KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; SESSION_KEY_SIZE]);
    let len = bytes.len().min(SESSION_KEY_SIZE);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}
