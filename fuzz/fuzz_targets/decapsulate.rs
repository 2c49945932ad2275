//! Fuzz target: decapsulation and envelope opening
//!
//! Arbitrary encapsulations, IVs, tags and ciphertexts against a fixed key
//! must fail cleanly, never panic.

#![no_main]

use std::sync::LazyLock;

use libfuzzer_sys::fuzz_target;
use lockbox_crypto::{
    DerivationConfig, Envelope, RsaPrivateKey, SESSION_KEY_SIZE, decapsulate, derive_keypair,
    open_envelope,
};

static KEY: LazyLock<RsaPrivateKey> = LazyLock::new(|| {
    let config = DerivationConfig { modulus_bits: 512, ..DerivationConfig::default() };
    derive_keypair(b"fuzz-decapsulate", &config).expect("fixed seed derives")
});

fuzz_target!(|data: &[u8]| {
    let _ = decapsulate(&KEY, data, SESSION_KEY_SIZE);

    if data.len() >= 28 {
        let (header, rest) = data.split_at(28);
        let mut iv = [0u8; 12];
        let mut tag = [0u8; 16];
        iv.copy_from_slice(&header[..12]);
        tag.copy_from_slice(&header[12..]);

        let split = rest.len().min(64);
        let envelope = Envelope {
            encapsulation: rest[..split].to_vec(),
            iv,
            tag,
            ciphertext: rest[split..].to_vec(),
        };
        assert!(open_envelope(&KEY, &envelope).is_err());
    }
});
