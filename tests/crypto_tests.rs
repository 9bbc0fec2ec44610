//! Integration tests for the FileVault crypto module.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::Bytes;
use filevault::crypto::{
    decrypt_stream, derive_master_key_with_params, encrypt_stream, generate_iv, generate_salt, rewrap,
    unwrap, wrap, Argon2Params, DataKey, MasterKey, ReleasePolicy, StreamDecryptor, StreamEncryptor,
    IV_LEN, TAG_LEN,
};
use filevault::errors::FileVaultError;
use filevault::storage::{BlobStream, ByteStream};
use futures::executor::block_on;
use futures::stream::{self, StreamExt, TryStreamExt};
use proptest::prelude::*;

fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8192,
        iterations: 1,
        parallelism: 1,
    }
}

fn source(data: &[u8], step: usize) -> BlobStream<'static> {
    let chunks: Vec<std::io::Result<Bytes>> = data
        .chunks(step.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

fn collect(stream: ByteStream<'static>) -> Result<Vec<u8>, FileVaultError> {
    block_on(async {
        let parts: Vec<Bytes> = stream.try_collect().await?;
        Ok(parts.concat())
    })
}

fn one_shot(key: &DataKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    Aes256Gcm::new(key.as_bytes().into())
        .encrypt(Nonce::from_slice(iv), plaintext)
        .expect("one-shot encrypt")
}

// ---------------------------------------------------------------------------
// Key derivation and wrapping
// ---------------------------------------------------------------------------

#[test]
fn derived_key_unwraps_what_it_wrapped() {
    let salt = generate_salt();
    let owner = derive_master_key_with_params(b"hunter22", &salt, &fast_params()).expect("derive");
    let data_key = DataKey::generate();

    let record = wrap(&data_key, &owner).expect("wrap");

    let again = derive_master_key_with_params(b"hunter22", &salt, &fast_params()).expect("derive");
    assert_eq!(unwrap(&record, &again).expect("unwrap").as_bytes(), data_key.as_bytes());

    let wrong = derive_master_key_with_params(b"hunter23", &salt, &fast_params()).expect("derive");
    assert!(matches!(unwrap(&record, &wrong), Err(FileVaultError::AuthenticationFailed)));
}

#[test]
fn rewrap_round_trip_returns_the_same_data_key() {
    let owner = MasterKey::generate();
    let server = MasterKey::generate();
    let data_key = DataKey::generate();

    let private = wrap(&data_key, &owner).expect("wrap");
    let public = rewrap(&private, &owner, &server).expect("to server");
    let private_again = rewrap(&public, &server, &owner).expect("back to owner");

    assert_ne!(private.iv, private_again.iv);
    assert_eq!(
        unwrap(&private_again, &owner).expect("unwrap").as_bytes(),
        data_key.as_bytes()
    );
}

// ---------------------------------------------------------------------------
// Streaming cipher
// ---------------------------------------------------------------------------

#[test]
fn encryptor_output_equals_one_shot_gcm() {
    let key = DataKey::generate();
    let iv = generate_iv();
    let plaintext: Vec<u8> = (0..70_000u32).map(|i| (i * 31 % 256) as u8).collect();

    let mut encryptor = StreamEncryptor::new(&key, &iv);
    let mut blob = Vec::new();
    for chunk in plaintext.chunks(64 * 1024) {
        blob.extend(encryptor.update(chunk).expect("update"));
    }
    blob.extend_from_slice(&encryptor.finalize());

    assert_eq!(blob, one_shot(&key, &iv, &plaintext));
}

#[test]
fn decryptor_accepts_one_shot_ciphertext() {
    let key = DataKey::generate();
    let iv = generate_iv();
    let blob = one_shot(&key, &iv, b"produced elsewhere");

    let mut decryptor = StreamDecryptor::new(&key, &iv);
    let mut out = Vec::new();
    for byte in &blob {
        out.extend(decryptor.update(std::slice::from_ref(byte)).expect("update"));
    }
    decryptor.finalize().expect("tag verifies");
    assert_eq!(out, b"produced elsewhere");
}

#[test]
fn every_single_byte_flip_is_detected() {
    let key = DataKey::generate();
    let iv = generate_iv();
    let blob = one_shot(&key, &iv, b"0123456789");
    assert_eq!(blob.len(), 10 + TAG_LEN);

    for i in 0..blob.len() {
        let mut tampered = blob.clone();
        tampered[i] ^= 0x01;
        let result = collect(decrypt_stream(&key, &iv, source(&tampered, 5), ReleasePolicy::Verified, 8));
        assert!(
            matches!(result, Err(FileVaultError::AuthenticationFailed)),
            "flip at byte {i}"
        );
    }
}

#[test]
fn wrong_iv_fails_authentication() {
    let key = DataKey::generate();
    let iv = [1u8; IV_LEN];
    let blob = one_shot(&key, &iv, b"some content");

    let result = collect(decrypt_stream(&key, &[2u8; IV_LEN], source(&blob, 4), ReleasePolicy::Optimistic, 8));
    assert!(matches!(result, Err(FileVaultError::AuthenticationFailed)));
}

#[test]
fn truncating_the_tag_is_detected() {
    let key = DataKey::generate();
    let iv = generate_iv();
    let blob = one_shot(&key, &iv, b"0123456789abcdef");

    let result = collect(decrypt_stream(
        &key,
        &iv,
        source(&blob[..blob.len() - 1], 7),
        ReleasePolicy::Optimistic,
        8,
    ));
    assert!(matches!(result, Err(FileVaultError::AuthenticationFailed)));

    let result = collect(decrypt_stream(&key, &iv, source(&blob[..10], 7), ReleasePolicy::Optimistic, 8));
    assert!(matches!(result, Err(FileVaultError::TruncatedCiphertext(10))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn chunking_never_changes_the_blob(
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        step in 1usize..300,
    ) {
        let key = DataKey::new([7u8; 32]);
        let iv = [9u8; IV_LEN];

        let blob = collect(encrypt_stream(&key, &iv, source(&plaintext, step))).unwrap();
        prop_assert_eq!(&blob, &one_shot(&key, &iv, &plaintext));
    }

    #[test]
    fn any_chunking_round_trips(
        plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
        enc_step in 1usize..300,
        dec_step in 1usize..300,
        verified in any::<bool>(),
    ) {
        let key = DataKey::generate();
        let iv = generate_iv();
        let policy = if verified { ReleasePolicy::Verified } else { ReleasePolicy::Optimistic };

        let blob = collect(encrypt_stream(&key, &iv, source(&plaintext, enc_step))).unwrap();
        let out = collect(decrypt_stream(&key, &iv, source(&blob, dec_step), policy, 128)).unwrap();
        prop_assert_eq!(out, plaintext);
    }
}
