//! Fuzz target: public key handle parsing
//!
//! Parsing arbitrary text must never panic, and every accepted handle must
//! render back in lowercase and yield a usable public key.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lockbox_crypto::PublicKeyHandle;

fuzz_target!(|input: &str| {
    if let Ok(handle) = PublicKeyHandle::parse(input) {
        assert_eq!(handle.as_str(), handle.as_str().to_ascii_lowercase());
        assert!(handle.to_public_key().is_ok());
    }
});
