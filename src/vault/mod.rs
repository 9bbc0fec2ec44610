//! Vault module: encrypted file records and the operations on them.
//!
//! This module provides:
//! - `EncryptedFile`, ids and the persisted record shape (`record`)
//! - The private/public state machine and key re-wrapping (`visibility`)
//! - The `FileVault` service used by the CLI (`service`)

pub mod record;
pub mod service;
pub mod visibility;

// Re-export the most commonly used items.
pub use record::{EncryptedFile, FileId, PublicId, StoredFileRecord};
pub use service::{Disposition, FileContent, FileVault, UploadRequest, VaultOptions};
pub use visibility::{Visibility, VisibilityManager};
