//! Registration and login.
//!
//! Each user record carries two independent Argon2id artefacts:
//!
//! - a PHC-format password verifier, checked at login;
//! - a 16-byte random salt, fed with the password into
//!   `derive_master_key` to produce the session master key.
//!
//! The salt is generated once at registration and never replaced.  A
//! record that lacks it can still pass the password check but can never
//! derive its key, so login refuses it outright.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::kdf::hasher;
use crate::crypto::{derive_master_key_with_params, generate_salt, Argon2Params, SALT_LEN};
use crate::errors::{FileVaultError, Result};
use crate::storage::UserDirectory;

use super::session::Session;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

const MAX_USER_ID_LEN: usize = 64;

/// A registered user as persisted by the `UserDirectory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// Hex-encoded master-key salt.
    #[serde(default)]
    pub salt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// The stored master-key salt, as raw bytes.
    pub fn salt_bytes(&self) -> Result<[u8; SALT_LEN]> {
        let Some(salt) = self.salt.as_deref() else {
            return Err(FileVaultError::KeyDerivationFailed(format!(
                "user '{}' has no key salt; their files cannot be decrypted",
                self.id
            )));
        };
        let mut bytes = [0u8; SALT_LEN];
        hex::decode_to_slice(salt, &mut bytes).map_err(|e| {
            FileVaultError::KeyDerivationFailed(format!("stored salt for '{}' is malformed: {e}", self.id))
        })?;
        Ok(bytes)
    }
}

/// Validate a user id.
///
/// Rules: 1 to 64 characters, ASCII letters, digits, `_`, `-` and `.`.
pub fn validate_user_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_USER_ID_LEN {
        return Err(FileVaultError::CommandFailed(format!(
            "user id must be 1 to {MAX_USER_ID_LEN} characters"
        )));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(FileVaultError::CommandFailed(format!(
            "user id contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

/// Create a user with a fresh key salt and password verifier.
pub async fn register(
    users: &dyn UserDirectory,
    user_id: &str,
    password: &str,
    params: &Argon2Params,
) -> Result<UserRecord> {
    validate_user_id(user_id)?;
    if password.len() < MIN_PASSWORD_LEN {
        return Err(FileVaultError::CommandFailed(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if users.find_user(user_id).await?.is_some() {
        return Err(FileVaultError::UserAlreadyExists(user_id.to_string()));
    }

    let password = Zeroizing::new(password.as_bytes().to_vec());
    let params = *params;
    let password_hash = blocking(move || hash_password(&password, &params)).await?;

    let user = UserRecord {
        id: user_id.to_string(),
        password_hash,
        salt: Some(hex::encode(generate_salt())),
        created_at: Utc::now(),
    };
    users.create_user(user.clone()).await?;
    info!(user = %user.id, "user registered");
    Ok(user)
}

/// Check the password and derive the session master key.
pub async fn login(
    users: &dyn UserDirectory,
    user_id: &str,
    password: &str,
    params: &Argon2Params,
    ttl: Duration,
) -> Result<Session> {
    let user = users
        .find_user(user_id)
        .await?
        .ok_or_else(|| FileVaultError::UserNotFound(user_id.to_string()))?;

    let password = Zeroizing::new(password.as_bytes().to_vec());
    let params = *params;
    let master_key = blocking(move || {
        verify_password(&password, &user.password_hash)?;
        let salt = user.salt_bytes()?;
        derive_master_key_with_params(&password, &salt, &params)
    })
    .await
    .inspect_err(|e| warn!(user = %user_id, error = %e, "login failed"))?;

    let session = Session::new(user_id, Arc::new(master_key), ttl)?;
    info!(user = %user_id, "session started");
    Ok(session)
}

fn hash_password(password: &[u8], params: &Argon2Params) -> Result<String> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| FileVaultError::KeyDerivationFailed(format!("verifier salt: {e}")))?;

    let hash = hasher(params)?
        .hash_password(password, &salt)
        .map_err(|e| FileVaultError::KeyDerivationFailed(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

fn verify_password(password: &[u8], phc: &str) -> Result<()> {
    let parsed = PasswordHash::new(phc).map_err(|e| {
        FileVaultError::KeyDerivationFailed(format!("stored password verifier is malformed: {e}"))
    })?;
    // The PHC string carries its own cost parameters.
    argon2::Argon2::default()
        .verify_password(password, &parsed)
        .map_err(|_| FileVaultError::InvalidCredentials)
}

/// Run Argon2 work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| FileVaultError::KeyDerivationFailed(format!("key derivation task failed: {e}")))?
}
