//! Key types for the envelope hierarchy.
//!
//! - `MasterKey` wraps and unwraps data keys.  It is either derived from a
//!   user's password (held in the session) or the process-wide server key
//!   used for public files.  It is never applied to file content.
//! - `DataKey` encrypts exactly one file's content.  It is generated at
//!   upload and only ever exists in memory.
//!
//! Both types zero their memory when dropped.

use std::fmt;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{FileVaultError, Result};

use super::KEY_LEN;

/// A 32-byte key used only to wrap data keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random master key (used for the server key).
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Parse a key from 64 hex characters.  Surrounding whitespace is
    /// ignored so key files may end with a newline.
    pub fn from_hex(input: &str) -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(input.trim(), &mut bytes).map_err(|e| {
            FileVaultError::ConfigError(format!(
                "master key must be {} hex characters: {e}",
                KEY_LEN * 2
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Hex-encode the key (for writing the server key file).
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// A per-file 32-byte content key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random data key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(<redacted>)")
    }
}
