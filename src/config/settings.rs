use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::keyfile::load_server_key_file;
use crate::crypto::{Argon2Params, MasterKey, ReleasePolicy};
use crate::errors::{FileVaultError, Result};

/// Environment variable that overrides the server key file.
pub const SERVER_KEY_ENV: &str = "FILEVAULT_SERVER_KEY";

/// Longest accepted `session_ttl_secs` (30 days).
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Store configuration, loaded from `filevault.toml`.
///
/// Every field has a sensible default so FileVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to the working directory) holding blobs,
    /// metadata and the server key.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 1).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Read size when streaming blobs back out (default: 64 KiB).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Whether decrypted bytes are released before the tag is checked.
    #[serde(default)]
    pub release_policy: ReleasePolicy,

    /// How long a login stays valid, in seconds (default: 1 hour).
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Server key location, relative to `data_dir` unless absolute.
    #[serde(default = "default_server_key_file")]
    pub server_key_file: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_data_dir() -> String {
    ".filevault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    1
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_server_key_file() -> String {
    "server.key".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            chunk_size: default_chunk_size(),
            release_policy: ReleasePolicy::default(),
            session_ttl_secs: default_session_ttl_secs(),
            server_key_file: default_server_key_file(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    pub const FILE_NAME: &'static str = "filevault.toml";

    /// Load settings from `<base_dir>/filevault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            FileVaultError::ConfigError(format!("Failed to read {}: {e}", config_path.display()))
        })?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            FileVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        if settings.chunk_size == 0 {
            return Err(FileVaultError::ConfigError(
                "chunk_size must be at least 1 byte".into(),
            ));
        }

        if settings.session_ttl_secs == 0 || settings.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(FileVaultError::ConfigError(format!(
                "session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
            )));
        }

        Ok(settings)
    }

    /// Render these settings as TOML (written by `init`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FileVaultError::SerializationError(format!("settings: {e}")))
    }

    /// Example: `base_dir/.filevault`
    pub fn data_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.data_dir)
    }

    /// Full path of the server key file.
    pub fn server_key_path(&self, base_dir: &Path) -> PathBuf {
        self.data_path(base_dir).join(&self.server_key_file)
    }

    /// Load the server master key: `FILEVAULT_SERVER_KEY` wins over the
    /// key file.  Missing or malformed keys are a `ConfigError`.
    pub fn load_server_key(&self, base_dir: &Path) -> Result<MasterKey> {
        match std::env::var(SERVER_KEY_ENV) {
            Ok(hex) if !hex.trim().is_empty() => MasterKey::from_hex(&hex).map_err(|_| {
                FileVaultError::ConfigError(format!("{SERVER_KEY_ENV} must be 64 hex characters"))
            }),
            _ => load_server_key_file(&self.server_key_path(base_dir)),
        }
    }

    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_ttl_secs)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
