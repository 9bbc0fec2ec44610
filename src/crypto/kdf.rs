//! Password-based key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that protects against brute-force and
//! GPU-based attacks.  A user's master key is derived from their password
//! and the salt persisted in their user record, so the same inputs must
//! produce the same key across restarts.  It is the only way back into a
//! user's private files.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::errors::{FileVaultError, Result};

use super::keys::MasterKey;
use super::{KEY_LEN, SALT_LEN};

/// Configurable Argon2id parameters.
///
/// These map 1:1 to the fields in `Settings` so the CLI can pass
/// whatever the operator configured in `filevault.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 1).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Derive a 32-byte master key with the default Argon2id parameters.
pub fn derive_master_key(secret: &[u8], salt: &[u8]) -> Result<MasterKey> {
    derive_master_key_with_params(secret, salt, &Argon2Params::default())
}

/// Derive a 32-byte master key with explicit Argon2id parameters.
///
/// The salt must be exactly 16 bytes.  Enforces minimum Argon2
/// parameters to prevent dangerously weak KDF settings.
pub fn derive_master_key_with_params(
    secret: &[u8],
    salt: &[u8],
    argon2_params: &Argon2Params,
) -> Result<MasterKey> {
    if salt.len() != SALT_LEN {
        return Err(FileVaultError::KeyDerivationFailed(format!(
            "salt must be {SALT_LEN} bytes (got {})",
            salt.len()
        )));
    }
    if argon2_params.memory_kib < MIN_MEMORY_KIB {
        return Err(FileVaultError::KeyDerivationFailed(format!(
            "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
            argon2_params.memory_kib
        )));
    }
    if argon2_params.iterations < 1 {
        return Err(FileVaultError::KeyDerivationFailed(
            "Argon2 iterations must be at least 1".into(),
        ));
    }
    if argon2_params.parallelism < 1 {
        return Err(FileVaultError::KeyDerivationFailed(
            "Argon2 parallelism must be at least 1".into(),
        ));
    }

    let argon2 = hasher(argon2_params)?;

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| FileVaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    let master = MasterKey::new(key);
    zeroize::Zeroize::zeroize(&mut key);
    Ok(master)
}

/// Build an Argon2id instance for the given parameters.
///
/// Shared with the password verifier so both use the same cost settings.
pub(crate) fn hasher(argon2_params: &Argon2Params) -> Result<Argon2<'static>> {
    let params = Params::new(
        argon2_params.memory_kib,
        argon2_params.iterations,
        argon2_params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| FileVaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Generate a cryptographically random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}
