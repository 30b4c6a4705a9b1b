//! Cryptographic test vectors from official specifications.
//!
//! This module contains test vectors from:
//! - RFC 7748 (X25519)
//! - The GCM specification (McGrew & Viega, AES-128 test cases)
//! - RFC 9180 (HPKE Auth mode), cross-checked against the `hpke` crate
//!
//! These vectors ensure the primitives under the label protocol match the
//! specifications exactly.

use hpke::rand_core::SeedableRng;
use hpke::{Deserializable, Kem as KemTrait, OpModeR, OpModeS, Serializable};
use rand_chacha::ChaCha20Rng;
use tally_crypto::aead::{AeadKey, Nonce};
use tally_crypto::hpke::{EncapsulatedKey, decapsulate, encapsulate};
use tally_crypto::label::{LabelSealer, open_label};
use tally_crypto::x25519::{PrivateKey, PublicKey};

fn decode_hex(text: &str) -> Vec<u8> {
    hex::decode(text).unwrap()
}

fn array_32(text: &str) -> [u8; 32] {
    decode_hex(text).try_into().unwrap()
}

// ============================================================================
// RFC 7748 Test Vectors (X25519)
// ============================================================================

#[test]
fn test_x25519_rfc7748_section_6_1() {
    let alice = PrivateKey::from_bytes(array_32(
        "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
    ));
    let bob = PrivateKey::from_bytes(array_32(
        "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb",
    ));

    assert_eq!(
        alice.public_key().to_bytes(),
        array_32("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
    );
    assert_eq!(
        bob.public_key().to_bytes(),
        array_32("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
    );

    let shared = array_32("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742");
    let alice_shared = alice.exchange(&bob.public_key()).expect("DH exchange failed");
    let bob_shared = bob.exchange(&alice.public_key()).expect("DH exchange failed");

    assert_eq!(alice_shared.as_bytes(), &shared);
    assert_eq!(bob_shared.as_bytes(), &shared);
}

#[test]
fn test_x25519_low_order_rejection() {
    let private = PrivateKey::generate().unwrap();

    // Identity element and the order-2 point both give an all-zero output
    let mut one = [0u8; 32];
    one[0] = 1;
    for point in [[0u8; 32], one] {
        assert!(private.exchange(&PublicKey::from_bytes(point)).is_none());
    }
}

// ============================================================================
// AES-128-GCM Test Vectors
// ============================================================================

#[test]
fn test_aes128gcm_test_case_1() {
    // Empty plaintext, zero key and IV: output is the tag alone
    let key = AeadKey::new([0u8; 16]);
    let nonce = Nonce::from_bytes([0u8; 12]);

    let output = key.encrypt(&nonce, b"", b"").unwrap();
    assert_eq!(output, decode_hex("58e2fccefa7e3061367f1d57a4e7455a"));
}

#[test]
fn test_aes128gcm_test_case_2() {
    let key = AeadKey::new([0u8; 16]);
    let nonce = Nonce::from_bytes([0u8; 12]);

    let output = key.encrypt(&nonce, &[0u8; 16], b"").unwrap();
    let expected = decode_hex(
        "0388dace60b6a392f328c2b971b2fe78\
         ab6e47d42cec13bdf53a67b21257bddf",
    );
    assert_eq!(output, expected);

    let plaintext = key.decrypt(&nonce, &output, b"").unwrap();
    assert_eq!(plaintext, [0u8; 16]);
}

// ============================================================================
// RFC 9180 HPKE Auth mode (DHKEM(X25519, HKDF-SHA256), HKDF-SHA256, AES-128-GCM)
// ============================================================================

type Kem = hpke::kem::X25519HkdfSha256;
type Kdf = hpke::kdf::HkdfSha256;
type Aead = hpke::aead::AesGcm128;

const CONTEXTS: [&[u8]; 4] = [
    b"match-system-operator.com",
    b"dsp.example",
    b"",
    b"a-much-longer-authority-name.subdomain.example.org",
];

fn hpke_private(key: &PrivateKey) -> <Kem as KemTrait>::PrivateKey {
    <Kem as KemTrait>::PrivateKey::from_bytes(&key.to_bytes()).unwrap()
}

fn hpke_public(key: &PublicKey) -> <Kem as KemTrait>::PublicKey {
    <Kem as KemTrait>::PublicKey::from_bytes(key.as_bytes()).unwrap()
}

fn rfc7748_pair() -> (PrivateKey, PrivateKey) {
    let sender = PrivateKey::from_bytes(array_32(
        "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a",
    ));
    let receiver = PrivateKey::from_bytes(array_32(
        "5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb",
    ));
    (sender, receiver)
}

#[test]
fn test_hpke_auth_reference_sender_to_decapsulate() {
    let (sender, receiver) = rfc7748_pair();
    let mut rng = ChaCha20Rng::from_seed([7u8; 32]);

    for info in CONTEXTS {
        let mode = OpModeS::Auth((hpke_private(&sender), hpke_public(&sender.public_key())));
        let (encapped, context) = hpke::setup_sender::<Aead, Kdf, Kem, _>(
            &mode,
            &hpke_public(&receiver.public_key()),
            info,
            &mut rng,
        )
        .unwrap();
        let mut expected = [0u8; 16];
        context.export(info, &mut expected).unwrap();

        let enc = EncapsulatedKey::from_slice(&encapped.to_bytes()).unwrap();
        let key = decapsulate(&enc, &receiver, &sender.public_key(), info).unwrap();
        assert_eq!(key.as_bytes(), &expected, "info {info:?}");
    }
}

#[test]
fn test_hpke_auth_encapsulate_to_reference_receiver() {
    let (sender, receiver) = rfc7748_pair();

    for info in CONTEXTS {
        let (enc, key) = encapsulate(&sender, &receiver.public_key(), info).unwrap();

        let encapped = <Kem as KemTrait>::EncappedKey::from_bytes(enc.as_bytes()).unwrap();
        let context = hpke::setup_receiver::<Aead, Kdf, Kem>(
            &OpModeR::Auth(hpke_public(&sender.public_key())),
            &hpke_private(&receiver),
            &encapped,
            info,
        )
        .unwrap();
        let mut expected = [0u8; 16];
        context.export(info, &mut expected).unwrap();

        assert_eq!(key.as_bytes(), &expected, "info {info:?}");
    }
}

#[test]
fn test_hpke_auth_reference_rejects_wrong_sender() {
    let (sender, receiver) = rfc7748_pair();
    let impostor = PrivateKey::from_bytes([0x42u8; 32]);
    let info = CONTEXTS[0];

    let (enc, key) = encapsulate(&impostor, &receiver.public_key(), info).unwrap();
    let encapped = <Kem as KemTrait>::EncappedKey::from_bytes(enc.as_bytes()).unwrap();
    let context = hpke::setup_receiver::<Aead, Kdf, Kem>(
        &OpModeR::Auth(hpke_public(&sender.public_key())),
        &hpke_private(&receiver),
        &encapped,
        info,
    )
    .unwrap();
    let mut derived = [0u8; 16];
    context.export(info, &mut derived).unwrap();

    assert_ne!(key.as_bytes(), &derived);
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn test_full_label_pipeline() {
    let matcher = PrivateKey::generate().unwrap();
    let dsp = PrivateKey::generate().unwrap();
    let info = b"match-system-operator.com";
    let txid = b"2VwhmTY9MecgWsu6";

    let (enc, sender_key) = encapsulate(&matcher, &dsp.public_key(), info).unwrap();
    let mut sealer = LabelSealer::new(sender_key).unwrap();
    let zero = sealer.seal_zero(txid).unwrap();
    let one = sealer.seal_one(txid).unwrap();
    assert_ne!(zero, one);

    let receiver_key = decapsulate(&enc, &dsp, &matcher.public_key(), info).unwrap();
    assert!(!open_label(&receiver_key, zero.as_str(), txid).unwrap());
    assert!(open_label(&receiver_key, one.as_str(), txid).unwrap());
}
