//! Private / public state of a file.
//!
//! A file's data key is wrapped under exactly one master key at a time:
//! the owner's session key while private, the server key while public.
//! Switching re-wraps those 32 bytes and never reads or rewrites the
//! ciphertext blob.

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::Session;
use crate::crypto::{rewrap, MasterKey, WrappedKeyRecord};
use crate::errors::{FileVaultError, Result};
use crate::storage::FileIndex;

use super::record::{EncryptedFile, FileId, PublicId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Data key wrapped under the owner's master key.
    Private { key: WrappedKeyRecord },
    /// Data key wrapped under the server key, reachable by `public_id`.
    Public {
        public_id: PublicId,
        key: WrappedKeyRecord,
    },
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public { .. })
    }

    pub fn public_id(&self) -> Option<&PublicId> {
        match self {
            Self::Private { .. } => None,
            Self::Public { public_id, .. } => Some(public_id),
        }
    }

    pub fn wrapped_key(&self) -> &WrappedKeyRecord {
        match self {
            Self::Private { key } | Self::Public { key, .. } => key,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Private { .. } => "private",
            Self::Public { .. } => "public",
        }
    }
}

/// Moves files between private and public.
pub struct VisibilityManager {
    index: Arc<dyn FileIndex>,
    server_key: Arc<MasterKey>,
}

impl VisibilityManager {
    pub fn new(index: Arc<dyn FileIndex>, server_key: Arc<MasterKey>) -> Self {
        Self { index, server_key }
    }

    /// Publish a private file and return its new public id.
    pub async fn make_public(&self, id: &FileId, session: &Session) -> Result<PublicId> {
        let owner_key = session.master_key()?;
        let file = self.owned_file(id, session).await?;

        let Visibility::Private { key } = &file.visibility else {
            return Err(FileVaultError::InvalidTransition {
                id: id.to_string(),
                state: "public",
            });
        };

        let public_key = rewrap(key, &owner_key, &self.server_key).inspect_err(|e| {
            warn!(file_id = %id, error = %e, "could not unwrap data key with the owner key");
        })?;
        let public_id = PublicId::generate();
        let next = Visibility::Public {
            public_id: public_id.clone(),
            key: public_key,
        };

        self.index.swap_visibility(id, &file.visibility, next).await?;
        info!(file_id = %id, owner = %file.owner_id, "file made public");
        Ok(public_id)
    }

    /// Withdraw a public file; its public id stops resolving.
    pub async fn make_private(&self, id: &FileId, session: &Session) -> Result<()> {
        let owner_key = session.master_key()?;
        let file = self.owned_file(id, session).await?;

        let Visibility::Public { key, .. } = &file.visibility else {
            return Err(FileVaultError::InvalidTransition {
                id: id.to_string(),
                state: "private",
            });
        };

        let private_key = rewrap(key, &self.server_key, &owner_key).inspect_err(|e| {
            warn!(file_id = %id, error = %e, "could not unwrap data key with the server key");
        })?;
        let next = Visibility::Private { key: private_key };

        self.index.swap_visibility(id, &file.visibility, next).await?;
        info!(file_id = %id, owner = %file.owner_id, "file made private");
        Ok(())
    }

    async fn owned_file(&self, id: &FileId, session: &Session) -> Result<EncryptedFile> {
        match self.index.get(id).await? {
            Some(file) if file.owner_id == session.user_id() => Ok(file),
            _ => Err(FileVaultError::FileNotFound(id.to_string())),
        }
    }
}
