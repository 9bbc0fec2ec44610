//! Storage collaborators.
//!
//! The vault never touches disk directly: ciphertext goes to a
//! `BlobStore`, file metadata to a `FileIndex`, user records to a
//! `UserDirectory`.  Each has an in-memory implementation (`memory`) and a
//! local-filesystem one (`fs`).  Handles are built once at start-up and
//! shared as `Arc<dyn …>`.

pub mod fs;
pub mod memory;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::auth::UserRecord;
use crate::errors::Result;
use crate::vault::{EncryptedFile, FileId, PublicId, Visibility};

pub use fs::{FsBlobStore, JsonFileIndex, JsonUserDirectory};
pub use memory::{MemoryBlobStore, MemoryFileIndex, MemoryUserDirectory};

/// Raw bytes as produced by a blob store or an upload body.
pub type BlobStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// Bytes produced by the cipher layer.
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes>>;

/// Ciphertext storage, addressed by file id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob and return its length.  If the stream yields an error
    /// nothing is stored and that error is returned.
    async fn put(&self, id: &FileId, body: ByteStream<'_>) -> Result<u64>;

    /// Stream a blob back.  A missing blob is `FileNotFound`.
    async fn get(&self, id: &FileId) -> Result<BlobStream<'static>>;

    /// Remove a blob.  Removing a missing blob is not an error.
    async fn delete(&self, id: &FileId) -> Result<()>;
}

/// File metadata.
#[async_trait]
pub trait FileIndex: Send + Sync {
    async fn insert(&self, file: EncryptedFile) -> Result<()>;

    async fn get(&self, id: &FileId) -> Result<Option<EncryptedFile>>;

    /// Files of `owner` directly under `path`, sorted by filename.
    async fn list(&self, owner: &str, path: &str) -> Result<Vec<EncryptedFile>>;

    async fn find_public(&self, public_id: &PublicId) -> Result<Option<EncryptedFile>>;

    /// Replace a file's visibility only if it still equals `expected`.
    ///
    /// Returns the updated record, `VisibilityConflict` if the stored
    /// visibility changed since it was read, or `FileNotFound` if the
    /// record is gone.
    async fn swap_visibility(
        &self,
        id: &FileId,
        expected: &Visibility,
        next: Visibility,
    ) -> Result<EncryptedFile>;

    /// Remove a record, returning it if it existed.
    async fn remove(&self, id: &FileId) -> Result<Option<EncryptedFile>>;
}

/// User records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>>;

    /// Store a new user; `UserAlreadyExists` if the id is taken.
    async fn create_user(&self, user: UserRecord) -> Result<()>;
}
