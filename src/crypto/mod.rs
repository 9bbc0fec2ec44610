//! Cryptographic primitives for FileVault.
//!
//! This module provides:
//! - Argon2id master-key derivation from a user's password (`kdf`)
//! - Master and data key types that zeroize on drop (`keys`)
//! - AES-256-GCM data-key wrapping (`envelope`)
//! - Streaming AES-256-GCM for file content (`stream`, on top of `gcm`)
//! - The on-disk server key file (`keyfile`)

pub mod envelope;
mod gcm;
pub mod kdf;
pub mod keyfile;
pub mod keys;
pub mod stream;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Per-user salt length in bytes.
pub const SALT_LEN: usize = 16;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{wrap, unwrap, derive_master_key, ...};
pub use envelope::{rewrap, unwrap, wrap, WrappedKeyRecord};
pub use kdf::{derive_master_key, derive_master_key_with_params, generate_salt, Argon2Params};
pub use keys::{DataKey, MasterKey};
pub use stream::{decrypt_stream, encrypt_stream, ReleasePolicy, StreamDecryptor, StreamEncryptor};

/// Generate a random 12-byte IV for content encryption.
pub fn generate_iv() -> [u8; IV_LEN] {
    use rand::RngCore;
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);
    iv
}
