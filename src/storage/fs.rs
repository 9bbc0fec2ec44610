//! Local-filesystem collaborators.
//!
//! Layout under the data directory:
//!
//! ```text
//! blobs/<file-id>.blob     ciphertext || tag
//! blobs/tmp/<file-id>.part upload in progress
//! files.json               file index
//! users.json               user directory
//! ```
//!
//! Every write goes to a temporary file first and is renamed into place,
//! so readers never observe a half-written blob or index.  The JSON
//! documents are cached in memory and guarded by a mutex; two processes
//! sharing one data directory are not coordinated.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::auth::UserRecord;
use crate::errors::{FileVaultError, Result};
use crate::vault::{EncryptedFile, FileId, PublicId, StoredFileRecord, Visibility};

use super::memory::select_listing;
use super::{BlobStore, BlobStream, ByteStream, FileIndex, UserDirectory};

/// A local disk failure, tagged with the path involved.
fn disk_error(path: &Path, e: io::Error) -> FileVaultError {
    FileVaultError::StorageError(format!("{}: {e}", path.display()))
}

/// Blobs stored one file each.
pub struct FsBlobStore {
    root: PathBuf,
    chunk_size: usize,
}

impl FsBlobStore {
    /// Open (creating if needed) the blob directory `<data_dir>/blobs`.
    pub async fn open(data_dir: &Path, chunk_size: usize) -> Result<Self> {
        let root = data_dir.join("blobs");
        let tmp = root.join("tmp");
        fs::create_dir_all(&tmp).await.map_err(|e| disk_error(&tmp, e))?;
        Ok(Self {
            root,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Where the committed blob for `id` lives.
    pub fn blob_path(&self, id: &FileId) -> PathBuf {
        self.root.join(format!("{id}.blob"))
    }

    fn part_path(&self, id: &FileId) -> PathBuf {
        self.root.join("tmp").join(format!("{id}.part"))
    }

    async fn write_part(&self, path: &Path, mut body: ByteStream<'_>) -> Result<u64> {
        let mut file = fs::File::create(path).await.map_err(|e| disk_error(path, e))?;
        let mut len = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| disk_error(path, e))?;
            len += chunk.len() as u64;
        }
        file.sync_all().await.map_err(|e| disk_error(path, e))?;
        Ok(len)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: &FileId, body: ByteStream<'_>) -> Result<u64> {
        let part = self.part_path(id);
        let committed = match self.write_part(&part, body).await {
            Ok(len) => fs::rename(&part, self.blob_path(id))
                .await
                .map(|()| len)
                .map_err(|e| disk_error(&part, e)),
            Err(e) => Err(e),
        };

        match committed {
            Ok(len) => {
                debug!(file_id = %id, len, "blob committed");
                Ok(len)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&part).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(file_id = %id, error = %cleanup, "could not remove partial blob");
                    }
                }
                Err(e)
            }
        }
    }

    async fn get(&self, id: &FileId) -> Result<BlobStream<'static>> {
        let file = match fs::File::open(self.blob_path(id)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FileVaultError::FileNotFound(id.to_string()));
            }
            Err(e) => return Err(disk_error(&self.blob_path(id), e)),
        };
        Ok(ReaderStream::with_capacity(file, self.chunk_size).boxed())
    }

    async fn delete(&self, id: &FileId) -> Result<()> {
        let path = self.blob_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(disk_error(&path, e)),
        }
    }
}

// ── JSON documents ───────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            FileVaultError::SerializationError(format!("{}: {e}", path.display()))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(disk_error(path, e)),
    }
}

/// Atomic write: temp file in the same directory, then rename.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| FileVaultError::SerializationError(format!("{}: {e}", path.display())))?;

    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, &bytes)
        .await
        .map_err(|e| disk_error(&tmp_path, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| disk_error(path, e))?;
    Ok(())
}

/// File index persisted as `files.json`.
pub struct JsonFileIndex {
    path: PathBuf,
    files: Mutex<HashMap<FileId, EncryptedFile>>,
}

impl JsonFileIndex {
    pub const FILE_NAME: &'static str = "files.json";

    /// Load the index from `<data_dir>/files.json`; a missing file is an
    /// empty index.  Any record that fails validation aborts the load.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| disk_error(data_dir, e))?;
        let path = data_dir.join(Self::FILE_NAME);

        let stored: Vec<StoredFileRecord> = read_json(&path).await?;
        let mut files = HashMap::with_capacity(stored.len());
        for record in stored {
            let file = EncryptedFile::try_from(record)?;
            files.insert(file.id.clone(), file);
        }

        Ok(Self {
            path,
            files: Mutex::new(files),
        })
    }

    async fn persist(&self, files: &HashMap<FileId, EncryptedFile>) -> Result<()> {
        let mut stored: Vec<StoredFileRecord> = files.values().map(StoredFileRecord::from).collect();
        stored.sort_by(|a, b| a.id.cmp(&b.id));
        write_json(&self.path, &stored).await
    }
}

#[async_trait]
impl FileIndex for JsonFileIndex {
    async fn insert(&self, file: EncryptedFile) -> Result<()> {
        let mut files = self.files.lock().await;
        let mut next = files.clone();
        next.insert(file.id.clone(), file);
        self.persist(&next).await?;
        *files = next;
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
        let current = files
            .get(id)
            .ok_or_else(|| FileVaultError::FileNotFound(id.to_string()))?;
        if &current.visibility != expected {
            return Err(FileVaultError::VisibilityConflict(id.to_string()));
        }

        let mut updated = current.clone();
        updated.visibility = next;

        let mut snapshot = files.clone();
        snapshot.insert(id.clone(), updated.clone());
        self.persist(&snapshot).await?;
        *files = snapshot;
        Ok(updated)
    }

    async fn remove(&self, id: &FileId) -> Result<Option<EncryptedFile>> {
        let mut files = self.files.lock().await;
        if !files.contains_key(id) {
            return Ok(None);
        }
        let mut next = files.clone();
        let removed = next.remove(id);
        self.persist(&next).await?;
        *files = next;
        Ok(removed)
    }
}

/// User directory persisted as `users.json`.
pub struct JsonUserDirectory {
    path: PathBuf,
    users: Mutex<Vec<UserRecord>>,
}

impl JsonUserDirectory {
    pub const FILE_NAME: &'static str = "users.json";

    pub async fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .map_err(|e| disk_error(data_dir, e))?;
        let path = data_dir.join(Self::FILE_NAME);
        let users: Vec<UserRecord> = read_json(&path).await?;
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }
}

#[async_trait]
impl UserDirectory for JsonUserDirectory {
    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: UserRecord) -> Result<()> {
        let mut users = self.users.lock().await;
        if users.iter().any(|u| u.id == user.id) {
            return Err(FileVaultError::UserAlreadyExists(user.id));
        }
        let mut next = users.clone();
        next.push(user);
        write_json(&self.path, &next).await?;
        *users = next;
        Ok(())
    }
}
