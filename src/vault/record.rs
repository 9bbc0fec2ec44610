//! File records stored in the metadata index.
//!
//! In memory a record carries a `Visibility` enum, so the wrapped key and
//! the public id can only change together.  On disk it is the flat JSON
//! shape the store has always used (camelCase, hex for binary fields);
//! `StoredFileRecord` converts between the two and refuses records whose
//! `publicId` disagrees with `isPublic`.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::crypto::{WrappedKeyRecord, IV_LEN, KEY_LEN, TAG_LEN};
use crate::errors::{FileVaultError, Result};

use super::visibility::Visibility;

/// Length of the random part of a public id (hex-encoded to 32 chars).
const PUBLIC_ID_LEN: usize = 16;

/// Opaque identifier of a stored file (and of its blob).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Parse an id supplied by a caller.  Only lowercase hex is accepted,
    /// which also keeps ids safe to use as file names.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty()
            || input.len() > 64
            || !input.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(FileVaultError::FileNotFound(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unguessable token granting unauthenticated read access to one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicId(String);

impl PublicId {
    /// 16 random bytes, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PUBLIC_ID_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut bytes = [0u8; PUBLIC_ID_LEN];
        hex::decode_to_slice(input, &mut bytes)
            .map_err(|_| FileVaultError::FileNotFound(input.to_string()))?;
        Ok(Self(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFile {
    pub id: FileId,
    pub owner_id: String,
    /// Logical folder path the file was uploaded into.
    pub path: String,
    pub filename: String,
    pub content_type: String,
    /// Stored blob length, ciphertext plus tag.
    pub size: u64,
    /// IV used for content encryption (distinct from the key-wrapping IV).
    pub content_iv: [u8; IV_LEN],
    pub visibility: Visibility,
    pub uploaded_at: DateTime<Utc>,
}

impl EncryptedFile {
    pub fn is_public(&self) -> bool {
        self.visibility.is_public()
    }

    pub fn public_id(&self) -> Option<&PublicId> {
        self.visibility.public_id()
    }

    /// Plaintext length (the blob minus its 16-byte tag).
    pub fn plaintext_len(&self) -> u64 {
        self.size.saturating_sub(TAG_LEN as u64)
    }
}

/// The persisted JSON shape of a file record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileRecord {
    pub id: FileId,
    pub owner_id: String,
    pub path: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub is_public: bool,
    pub public_id: Option<PublicId>,
    /// Content IV (hex).
    pub iv: String,
    /// Wrapped data key (hex).
    pub encrypted_data_key: String,
    /// Key-wrapping IV (hex).
    pub key_iv: String,
    /// Key-wrapping tag (hex).
    pub key_auth_tag: String,
}

impl From<&EncryptedFile> for StoredFileRecord {
    fn from(file: &EncryptedFile) -> Self {
        let key = file.visibility.wrapped_key();
        Self {
            id: file.id.clone(),
            owner_id: file.owner_id.clone(),
            path: file.path.clone(),
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            size: file.size,
            uploaded_at: file.uploaded_at,
            is_public: file.is_public(),
            public_id: file.public_id().cloned(),
            iv: hex::encode(file.content_iv),
            encrypted_data_key: hex::encode(key.wrapped_key),
            key_iv: hex::encode(key.iv),
            key_auth_tag: hex::encode(key.auth_tag),
        }
    }
}

impl TryFrom<StoredFileRecord> for EncryptedFile {
    type Error = FileVaultError;

    fn try_from(stored: StoredFileRecord) -> Result<Self> {
        let key = WrappedKeyRecord {
            iv: decode_field::<IV_LEN>(&stored.id, "keyIv", &stored.key_iv)?,
            wrapped_key: decode_field::<KEY_LEN>(&stored.id, "encryptedDataKey", &stored.encrypted_data_key)?,
            auth_tag: decode_field::<TAG_LEN>(&stored.id, "keyAuthTag", &stored.key_auth_tag)?,
        };

        let visibility = match (stored.is_public, stored.public_id) {
            (false, None) => Visibility::Private { key },
            (true, Some(public_id)) => Visibility::Public { public_id, key },
            (true, None) => {
                return Err(FileVaultError::InvalidRecord(format!(
                    "file '{}' is public but has no publicId",
                    stored.id
                )));
            }
            (false, Some(_)) => {
                return Err(FileVaultError::InvalidRecord(format!(
                    "file '{}' is private but still has a publicId",
                    stored.id
                )));
            }
        };

        Ok(Self {
            content_iv: decode_field::<IV_LEN>(&stored.id, "iv", &stored.iv)?,
            id: stored.id,
            owner_id: stored.owner_id,
            path: stored.path,
            filename: stored.filename,
            content_type: stored.content_type,
            size: stored.size,
            visibility,
            uploaded_at: stored.uploaded_at,
        })
    }
}

fn decode_field<const N: usize>(id: &FileId, field: &str, value: &str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value, &mut out).map_err(|e| {
        FileVaultError::InvalidRecord(format!("file '{id}': field {field} is not {N} hex bytes: {e}"))
    })?;
    Ok(out)
}
