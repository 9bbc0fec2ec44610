//! The server key file.
//!
//! Public files have their data keys wrapped under a single server-wide
//! master key.  It lives in `<data_dir>/server.key` as 64 hex characters
//! (or comes from `FILEVAULT_SERVER_KEY`, see `config::Settings`).

use std::fs;
use std::path::Path;

use crate::errors::{FileVaultError, Result};

use super::keys::MasterKey;

/// Generate a new random server key and write it to `path`.
///
/// Refuses to overwrite an existing file: replacing the key would orphan
/// every public file's wrapped key.
pub fn generate_server_key_file(path: &Path) -> Result<MasterKey> {
    if path.exists() {
        return Err(FileVaultError::ConfigError(format!(
            "server key already exists at {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                FileVaultError::ConfigError(format!("cannot create key directory: {e}"))
            })?;
        }
    }

    let key = MasterKey::generate();
    fs::write(path, format!("{}\n", key.to_hex()))
        .map_err(|e| FileVaultError::ConfigError(format!("failed to write server key: {e}")))?;

    // On Unix, restrict permissions to owner-only read/write.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| {
            FileVaultError::ConfigError(format!("failed to set server key permissions: {e}"))
        })?;
    }

    Ok(key)
}

/// Load and validate the server key stored at `path`.
pub fn load_server_key_file(path: &Path) -> Result<MasterKey> {
    if !path.exists() {
        return Err(FileVaultError::ConfigError(format!(
            "server key not found at {} (run `filevault init` or set FILEVAULT_SERVER_KEY)",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| FileVaultError::ConfigError(format!("failed to read server key: {e}")))?;

    MasterKey::from_hex(&contents)
}
