//! `filevault init`: create the data directory, config and server key.

use std::fs;

use crate::cli::output;
use crate::cli::{load_settings, Cli};
use crate::config::Settings;
use crate::crypto::keyfile::generate_server_key_file;
use crate::errors::{FileVaultError, Result};

/// Execute the `init` command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let (cwd, settings) = load_settings(cli)?;

    // 1. Write a default config unless one exists.
    let config_path = cwd.join(Settings::FILE_NAME);
    if !config_path.exists() {
        fs::write(&config_path, settings.to_toml()?).map_err(|e| {
            FileVaultError::ConfigError(format!("cannot write {}: {e}", config_path.display()))
        })?;
        output::info(&format!("Wrote {}", config_path.display()));
    }

    // 2. Create the data directory.
    let data_dir = settings.data_path(&cwd);
    if !data_dir.exists() {
        fs::create_dir_all(&data_dir).map_err(|e| {
            FileVaultError::StorageError(format!("{}: {e}", data_dir.display()))
        })?;
        output::info(&format!("Created data directory: {}", data_dir.display()));
    }

    // 3. Generate the server key, never replacing an existing one.
    let key_path = settings.server_key_path(&cwd);
    if key_path.exists() {
        output::info(&format!("Server key already present at {}", key_path.display()));
    } else {
        generate_server_key_file(&key_path)?;
        output::success(&format!("Server key created at {}", key_path.display()));
        output::warning("Keep the server key safe: without it, public files cannot be decrypted.");
    }

    #[cfg(feature = "audit-log")]
    crate::audit::log_audit(&data_dir, "init", None, None, None);

    output::tip("Run `filevault register --user <NAME>` to create a user.");
    output::tip("Run `filevault upload <FILE> --user <NAME>` to store a file.");

    Ok(())
}
