//! Fuzz target for label opening
//!
//! Sealed labels arrive from the network; opening arbitrary text must fail
//! cleanly and only ever succeed for genuine labels.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tally_crypto::aead::AeadKey;
use tally_crypto::label::{LabelSealer, SequenceCounter, open_label};

#[derive(Debug, Arbitrary)]
struct LabelInput {
    key: [u8; 16],
    base_nonce: [u8; 12],
    counter: [u8; 12],
    label: bool,
    aad: Vec<u8>,
    sealed: String,
}

fuzz_target!(|input: LabelInput| {
    let key = AeadKey::new(input.key);

    // Arbitrary text should never panic
    if let Err(e) = open_label(&key, &input.sealed, &input.aad) {
        assert!(e.is_ignorable());
    }

    let mut sealer = LabelSealer::resume(
        key.clone(),
        input.base_nonce,
        SequenceCounter::from_be_bytes(input.counter),
    );
    if let Ok(sealed) = sealer.seal(input.label, &input.aad) {
        assert_eq!(open_label(&key, sealed.as_str(), &input.aad), Ok(input.label));
    }
});
