//! Fuzz target: CBOR envelope decoding
//!
//! Decoding arbitrary bytes must never panic. Anything that decodes must
//! re-encode to an envelope that decodes to the same value.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lockbox_crypto::Envelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = Envelope::from_cbor(data) {
        let encoded = envelope.to_cbor().expect("decoded envelope must encode");
        let decoded = Envelope::from_cbor(&encoded).expect("re-encoded envelope must decode");
        assert_eq!(decoded, envelope);
    }
});
