//! In-memory collaborators, used by tests and as a reference for the
//! filesystem implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, RwLock};

use crate::auth::UserRecord;
use crate::errors::{FileVaultError, Result};
use crate::vault::{EncryptedFile, FileId, PublicId, Visibility};

use super::{BlobStore, BlobStream, ByteStream, FileIndex, UserDirectory};

/// Blobs held as contiguous buffers, streamed back in fixed-size slices.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<FileId, Bytes>>,
    chunk_size: usize,
}

impl MemoryBlobStore {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    /// The stored bytes of a blob, if any.
    pub async fn raw(&self, id: &FileId) -> Option<Bytes> {
        self.blobs.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: &FileId, mut body: ByteStream<'_>) -> Result<u64> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let len = buf.len() as u64;
        self.blobs.write().await.insert(id.clone(), buf.freeze());
        Ok(len)
    }

    async fn get(&self, id: &FileId) -> Result<BlobStream<'static>> {
        let blob = self
            .raw(id)
            .await
            .ok_or_else(|| FileVaultError::FileNotFound(id.to_string()))?;

        let chunk_size = self.chunk_size;
        let chunks: Vec<Bytes> = (0..blob.len())
            .step_by(chunk_size)
            .map(|start| blob.slice(start..(start + chunk_size).min(blob.len())))
            .collect();
        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn delete(&self, id: &FileId) -> Result<()> {
        self.blobs.write().await.remove(id);
        Ok(())
    }
}

/// File records in a map behind one lock, so a visibility swap is a single
/// critical section.
#[derive(Default)]
pub struct MemoryFileIndex {
    files: Mutex<HashMap<FileId, EncryptedFile>>,
}

impl MemoryFileIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileIndex for MemoryFileIndex {
    async fn insert(&self, file: EncryptedFile) -> Result<()> {
        self.files.lock().await.insert(file.id.clone(), file);
        Ok(())
    }

    async fn get(&self, id: &FileId) -> Result<Option<EncryptedFile>> {
        Ok(self.files.lock().await.get(id).cloned())
    }

    async fn list(&self, owner: &str, path: &str) -> Result<Vec<EncryptedFile>> {
        let files = self.files.lock().await;
        Ok(select_listing(files.values(), owner, path))
    }

    async fn find_public(&self, public_id: &PublicId) -> Result<Option<EncryptedFile>> {
        let files = self.files.lock().await;
        Ok(files
            .values()
            .find(|f| f.public_id() == Some(public_id))
            .cloned())
    }

    async fn swap_visibility(
        &self,
        id: &FileId,
        expected: &Visibility,
        next: Visibility,
    ) -> Result<EncryptedFile> {
        let mut files = self.files.lock().await;
        let file = files
            .get_mut(id)
            .ok_or_else(|| FileVaultError::FileNotFound(id.to_string()))?;
        if &file.visibility != expected {
            return Err(FileVaultError::VisibilityConflict(id.to_string()));
        }
        file.visibility = next;
        Ok(file.clone())
    }

    async fn remove(&self, id: &FileId) -> Result<Option<EncryptedFile>> {
        Ok(self.files.lock().await.remove(id))
    }
}

/// Users keyed by id.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn create_user(&self, user: UserRecord) -> Result<()> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(FileVaultError::UserAlreadyExists(user.id));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

/// Shared by both index implementations.
pub(crate) fn select_listing<'a>(
    files: impl Iterator<Item = &'a EncryptedFile>,
    owner: &str,
    path: &str,
) -> Vec<EncryptedFile> {
    let mut listing: Vec<EncryptedFile> = files
        .filter(|f| f.owner_id == owner && f.path == path)
        .cloned()
        .collect();
    listing.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.id.cmp(&b.id)));
    listing
}
