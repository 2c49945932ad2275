//! Error types for the cryptographic primitives.
//!
//! No variant carries key material, seeds or plaintext. Variants describe
//! shapes (lengths, sizes, indexes) only, so errors are safe to log.

use thiserror::Error;

use crate::envelope::Envelope;

/// Errors from deterministic key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerivationError {
    /// Seed was empty; there is nothing to expand.
    #[error("seed is empty")]
    EmptySeed,

    /// Configured modulus size is not supported.
    #[error("unsupported modulus size: {bits} bits")]
    UnsupportedModulusSize {
        /// Requested modulus size in bits.
        bits: usize,
    },

    /// No probable prime found within the candidate budget.
    #[error("prime search exhausted after {candidates} candidates ({bits}-bit prime)")]
    PrimeSearchExhausted {
        /// Size of the prime being searched for.
        bits: usize,
        /// Number of candidates tested.
        candidates: usize,
    },

    /// Both prime searches landed on the same prime.
    #[error("degenerate key: p == q")]
    DegeneratePrimes,

    /// The generated components were rejected when assembling the key.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Description of the rejection.
        reason: String,
    },
}

/// Errors from the RSA key encapsulation mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KemError {
    /// Requested key length is zero or beyond the KDF output bound.
    #[error("invalid key length {requested} (must be 1..={max})")]
    InvalidKeyLength {
        /// Requested output length in bytes.
        requested: usize,
        /// Largest supported output length in bytes.
        max: usize,
    },

    /// Encapsulation does not have the byte length of the modulus.
    #[error("malformed encapsulation: expected {expected} bytes, got {actual}")]
    EncapsulationLength {
        /// Byte length of the recipient modulus.
        expected: usize,
        /// Byte length received.
        actual: usize,
    },

    /// Encapsulation integer is not below the modulus.
    #[error("malformed encapsulation: value out of range")]
    EncapsulationOutOfRange,
}

impl KemError {
    /// Returns true if the error was caused by a malformed encapsulation
    /// rather than a caller mistake.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::EncapsulationLength { .. } | Self::EncapsulationOutOfRange)
    }
}

/// Errors from the authenticated symmetric cipher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Tag verification failed; no plaintext is released.
    #[error("authentication failed")]
    AuthFailure,

    /// Plaintext exceeds the AES-GCM length limit.
    #[error("plaintext too long: {len} bytes")]
    PlaintextTooLong {
        /// Plaintext length in bytes.
        len: usize,
    },
}

/// Errors from parsing a public key handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    /// Handle string is empty.
    #[error("public key handle is empty")]
    Empty,

    /// Handle carries a `0x` prefix, which the wire format forbids.
    #[error("public key handle must not carry a 0x prefix")]
    Prefixed,

    /// Handle contains a character that is not a hex digit.
    #[error("invalid hex digit at position {position}")]
    InvalidHex {
        /// Byte offset of the first offending character.
        position: usize,
    },

    /// Modulus size is outside the accepted range.
    #[error("modulus size {bits} bits outside {min}..={max}")]
    ModulusSize {
        /// Size of the parsed modulus.
        bits: usize,
        /// Smallest accepted size.
        min: usize,
        /// Largest accepted size.
        max: usize,
    },

    /// Modulus is even and cannot be an RSA modulus.
    #[error("modulus is even")]
    EvenModulus,

    /// The RSA implementation rejected the key.
    #[error("public key rejected: {reason}")]
    Rejected {
        /// Description of the rejection.
        reason: String,
    },
}

/// Errors from building or opening a single envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Recipient public key could not be parsed.
    #[error("recipient key: {0}")]
    Handle(#[from] HandleError),

    /// Key encapsulation failed.
    #[error("key encapsulation: {0}")]
    Kem(#[from] KemError),

    /// Symmetric encryption or tag verification failed.
    #[error("cipher: {0}")]
    Cipher(#[from] CipherError),

    /// Envelope could not be serialized.
    #[error("envelope encoding failed: {reason}")]
    Encode {
        /// Description of the encoding failure.
        reason: String,
    },

    /// Bytes are not a well-formed envelope.
    #[error("envelope decoding failed: {reason}")]
    Decode {
        /// Description of the decoding failure.
        reason: String,
    },
}

impl EnvelopeError {
    /// Returns true if the failure happened while opening an envelope
    /// (bad encapsulation or tag mismatch).
    pub fn is_decryption_failure(&self) -> bool {
        match self {
            Self::Kem(e) => e.is_malformed(),
            Self::Cipher(CipherError::AuthFailure) => true,
            _ => false,
        }
    }
}

/// A recipient whose envelope could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientFailure {
    /// Position of the recipient in the input list.
    pub index: usize,
    /// Why this recipient failed.
    pub error: EnvelopeError,
}

/// Multi-recipient encryption that failed for at least one recipient.
///
/// Carries every envelope that was produced so callers can still deliver to
/// the recipients that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("encryption failed for {} of {} recipients", .failures.len(), .failures.len() + .envelopes.len())]
pub struct PartialEncryptionError {
    /// Successful envelopes paired with their recipient index, in input order.
    pub envelopes: Vec<(usize, Envelope)>,
    /// Failed recipients, in input order.
    pub failures: Vec<RecipientFailure>,
}

impl PartialEncryptionError {
    /// Indexes of the recipients that failed.
    pub fn failed_indexes(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }

    /// Returns the envelope produced for `index`, if any.
    pub fn envelope_for(&self, index: usize) -> Option<&Envelope> {
        self.envelopes.iter().find(|(i, _)| *i == index).map(|(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_encapsulation_is_decryption_failure() {
        let err = EnvelopeError::from(KemError::EncapsulationLength { expected: 128, actual: 3 });
        assert!(err.is_decryption_failure());

        let err = EnvelopeError::from(KemError::EncapsulationOutOfRange);
        assert!(err.is_decryption_failure());
    }

    #[test]
    fn auth_failure_is_decryption_failure() {
        let err = EnvelopeError::from(CipherError::AuthFailure);
        assert!(err.is_decryption_failure());
    }

    #[test]
    fn caller_mistakes_are_not_decryption_failures() {
        let err = EnvelopeError::from(KemError::InvalidKeyLength { requested: 0, max: 5100 });
        assert!(!err.is_decryption_failure());

        let err = EnvelopeError::from(HandleError::Empty);
        assert!(!err.is_decryption_failure());
    }

    #[test]
    fn error_display() {
        let err = KemError::EncapsulationLength { expected: 128, actual: 127 };
        assert_eq!(err.to_string(), "malformed encapsulation: expected 128 bytes, got 127");

        let err = HandleError::ModulusSize { bits: 256, min: 512, max: 4096 };
        assert_eq!(err.to_string(), "modulus size 256 bits outside 512..=4096");
    }

    #[test]
    fn partial_error_display_counts_recipients() {
        let err = PartialEncryptionError {
            envelopes: Vec::new(),
            failures: vec![RecipientFailure { index: 0, error: HandleError::Empty.into() }],
        };
        assert_eq!(err.to_string(), "encryption failed for 1 of 1 recipients");
        assert_eq!(err.failed_indexes(), vec![0]);
        assert!(err.envelope_for(0).is_none());
    }
}
