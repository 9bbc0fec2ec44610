//! Data-key wrapping with AES-256-GCM.
//!
//! Only the 32-byte data key is ever encrypted under a master key, never
//! the file content, so moving a file between visibilities re-wraps about
//! 60 bytes of metadata no matter how large the file is.
//!
//! A wrapped key is stored as three fixed-size fields:
//!   [ iv: 12 bytes ][ wrapped_key: 32 bytes ][ auth_tag: 16 bytes ]

use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce, Tag};
use zeroize::Zeroize;

use crate::errors::{FileVaultError, Result};

use super::keys::{DataKey, MasterKey};
use super::{IV_LEN, KEY_LEN, TAG_LEN};

/// A data key encrypted under a master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrappedKeyRecord {
    pub iv: [u8; IV_LEN],
    pub wrapped_key: [u8; KEY_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

/// Encrypt `data_key` under `master_key`.
///
/// A fresh random nonce is generated on every call.
pub fn wrap(data_key: &DataKey, master_key: &MasterKey) -> Result<WrappedKeyRecord> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = *data_key.as_bytes();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, b"", &mut buffer)
        .map_err(|e| {
            buffer.zeroize();
            FileVaultError::EncryptionFailed(format!("key wrap failed: {e}"))
        })?;

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&nonce);
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&tag);

    Ok(WrappedKeyRecord {
        iv,
        wrapped_key: buffer,
        auth_tag,
    })
}

/// Decrypt a wrapped data key, verifying its tag.
///
/// Any failure (wrong master key, corrupted record, tampering) yields
/// `AuthenticationFailed`; no key material is returned in that case.
pub fn unwrap(record: &WrappedKeyRecord, master_key: &MasterKey) -> Result<DataKey> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key.as_bytes()));
    let nonce = Nonce::from_slice(&record.iv);
    let tag = Tag::from_slice(&record.auth_tag);

    let mut buffer = record.wrapped_key;
    if cipher
        .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
        .is_err()
    {
        buffer.zeroize();
        return Err(FileVaultError::AuthenticationFailed);
    }

    let key = DataKey::new(buffer);
    buffer.zeroize();
    Ok(key)
}

/// Move a wrapped data key from one master key to another.
///
/// The plaintext data key only lives for the duration of this call.
pub fn rewrap(
    record: &WrappedKeyRecord,
    from: &MasterKey,
    to: &MasterKey,
) -> Result<WrappedKeyRecord> {
    let data_key = unwrap(record, from)?;
    wrap(&data_key, to)
}
