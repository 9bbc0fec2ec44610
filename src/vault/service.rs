//! The file service: upload, listing, owner downloads, public fetches,
//! deletion and visibility changes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::crypto::{
    decrypt_stream, encrypt_stream, generate_iv, unwrap, wrap, DataKey, MasterKey, ReleasePolicy,
};
use crate::errors::{FileVaultError, Result};
use crate::storage::{BlobStore, BlobStream, ByteStream, FileIndex};

use super::record::{EncryptedFile, FileId, PublicId};
use super::visibility::{Visibility, VisibilityManager};

/// An upload as handed over by the transport layer.
pub struct UploadRequest {
    pub path: String,
    pub filename: String,
    pub content_type: String,
    pub body: BlobStream<'static>,
}

/// How the consumer should present the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Download { filename: String },
    Preview,
}

impl Disposition {
    /// `Content-Disposition` header value.
    pub fn header_value(&self) -> String {
        match self {
            Self::Download { filename } => {
                format!("inline; filename=\"{}\"", filename.replace(['"', '\\'], "_"))
            }
            Self::Preview => "inline".to_string(),
        }
    }
}

/// Decrypted content plus the record it came from.
pub struct FileContent {
    pub file: EncryptedFile,
    pub disposition: Disposition,
    pub body: ByteStream<'static>,
}

/// Tunables taken from `Settings`.
#[derive(Debug, Clone, Copy)]
pub struct VaultOptions {
    pub release_policy: ReleasePolicy,
    pub chunk_size: usize,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            release_policy: ReleasePolicy::default(),
            chunk_size: 64 * 1024,
        }
    }
}

pub struct FileVault {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn FileIndex>,
    server_key: Arc<MasterKey>,
    visibility: VisibilityManager,
    options: VaultOptions,
}

impl FileVault {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn FileIndex>,
        server_key: Arc<MasterKey>,
        options: VaultOptions,
    ) -> Self {
        Self {
            visibility: VisibilityManager::new(index.clone(), server_key.clone()),
            blobs,
            index,
            server_key,
            options,
        }
    }

    /// Encrypt and store a new private file.
    ///
    /// The blob is written first; the record is only inserted once the
    /// blob is complete, so a failed upload leaves nothing listable.
    pub async fn upload(&self, session: &Session, request: UploadRequest) -> Result<EncryptedFile> {
        let owner_key = session.master_key()?;

        let id = FileId::generate();
        let data_key = DataKey::generate();
        let content_iv = generate_iv();
        let key = wrap(&data_key, &owner_key)?;

        let ciphertext = encrypt_stream(&data_key, &content_iv, request.body);
        let size = match self.blobs.put(&id, ciphertext).await {
            Ok(size) => size,
            Err(e) => {
                warn!(file_id = %id, error = %e, "upload failed, discarding blob");
                if let Err(cleanup) = self.blobs.delete(&id).await {
                    warn!(file_id = %id, error = %cleanup, "could not remove partial blob");
                }
                return Err(e);
            }
        };

        let file = EncryptedFile {
            id,
            owner_id: session.user_id().to_string(),
            path: request.path,
            filename: request.filename,
            content_type: request.content_type,
            size,
            content_iv,
            visibility: Visibility::Private { key },
            uploaded_at: Utc::now(),
        };

        if let Err(e) = self.index.insert(file.clone()).await {
            warn!(file_id = %file.id, error = %e, "could not record upload, removing blob");
            if let Err(cleanup) = self.blobs.delete(&file.id).await {
                warn!(file_id = %file.id, error = %cleanup, "could not remove orphaned blob");
            }
            return Err(e);
        }

        info!(file_id = %file.id, owner = %file.owner_id, size = file.size, "file uploaded");
        Ok(file)
    }

    /// The caller's files directly under `path`.  Needs no key material.
    pub async fn list_files(&self, session: &Session, path: &str) -> Result<Vec<EncryptedFile>> {
        self.index.list(session.user_id(), path).await
    }

    /// Owner download with an attachment-style disposition.
    pub async fn download(&self, session: &Session, id: &FileId) -> Result<FileContent> {
        let file = self.owned_file(session, id).await?;
        let disposition = Disposition::Download {
            filename: file.filename.clone(),
        };
        self.open_as_owner(session, file, disposition).await
    }

    /// Owner view for in-browser rendering.
    pub async fn preview(&self, session: &Session, id: &FileId) -> Result<FileContent> {
        let file = self.owned_file(session, id).await?;
        self.open_as_owner(session, file, Disposition::Preview).await
    }

    /// Unauthenticated access through a public id.
    pub async fn fetch_public(&self, public_id: &PublicId) -> Result<FileContent> {
        let file = self
            .index
            .find_public(public_id)
            .await?
            .ok_or_else(|| FileVaultError::FileNotFound(public_id.to_string()))?;

        let data_key = unwrap(file.visibility.wrapped_key(), &self.server_key)?;
        let disposition = Disposition::Download {
            filename: file.filename.clone(),
        };
        debug!(file_id = %file.id, "serving public file");
        self.open(data_key, file, disposition).await
    }

    /// Delete a file: the record goes first, then the blob.
    pub async fn delete_file(&self, session: &Session, id: &FileId) -> Result<EncryptedFile> {
        let file = self.owned_file(session, id).await?;
        let removed = self
            .index
            .remove(&file.id)
            .await?
            .ok_or_else(|| FileVaultError::FileNotFound(id.to_string()))?;

        if let Err(e) = self.blobs.delete(&removed.id).await {
            warn!(file_id = %removed.id, error = %e, "record removed but blob could not be deleted");
        }
        info!(file_id = %removed.id, owner = %removed.owner_id, "file deleted");
        Ok(removed)
    }

    pub async fn make_public(&self, session: &Session, id: &FileId) -> Result<PublicId> {
        self.visibility.make_public(id, session).await
    }

    pub async fn make_private(&self, session: &Session, id: &FileId) -> Result<()> {
        self.visibility.make_private(id, session).await
    }

    /// Look a record up for its owner.  Other users' files are reported
    /// as missing rather than forbidden.
    async fn owned_file(&self, session: &Session, id: &FileId) -> Result<EncryptedFile> {
        match self.index.get(id).await? {
            Some(file) if file.owner_id == session.user_id() => Ok(file),
            _ => Err(FileVaultError::FileNotFound(id.to_string())),
        }
    }

    /// Owner access always needs a live session, even for public files.
    async fn open_as_owner(
        &self,
        session: &Session,
        file: EncryptedFile,
        disposition: Disposition,
    ) -> Result<FileContent> {
        let owner_key = session.master_key()?;
        let wrapping_key = match &file.visibility {
            Visibility::Private { .. } => owner_key.as_ref(),
            Visibility::Public { .. } => self.server_key.as_ref(),
        };
        let data_key = unwrap(file.visibility.wrapped_key(), wrapping_key)?;
        self.open(data_key, file, disposition).await
    }

    async fn open(
        &self,
        data_key: DataKey,
        file: EncryptedFile,
        disposition: Disposition,
    ) -> Result<FileContent> {
        let ciphertext = self.blobs.get(&file.id).await?;
        let body = decrypt_stream(
            &data_key,
            &file.content_iv,
            ciphertext,
            self.options.release_policy,
            self.options.chunk_size,
        );
        Ok(FileContent {
            file,
            disposition,
            body,
        })
    }
}
