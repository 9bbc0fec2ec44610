use thiserror::Error;

/// All errors that can occur in FileVault.
#[derive(Debug, Error)]
pub enum FileVaultError {
    // --- Crypto errors ---
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Authentication failed — wrong key or tampered data")]
    AuthenticationFailed,

    #[error("Ciphertext too short: {0} bytes, cannot contain a 16-byte tag")]
    TruncatedCiphertext(usize),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    // --- Session errors ---
    #[error("Session expired — log in again to access your files")]
    SessionExpired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    // --- Record errors ---
    #[error("File '{0}' not found")]
    FileNotFound(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("User '{0}' already exists")]
    UserAlreadyExists(String),

    #[error("File '{id}' is already {state}")]
    InvalidTransition { id: String, state: &'static str },

    #[error("Visibility of file '{0}' was changed by a concurrent request")]
    VisibilityConflict(String),

    #[error("Invalid file record: {0}")]
    InvalidRecord(String),

    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    // --- Local storage errors ---
    #[error("Storage error: {0}")]
    StorageError(String),

    // --- Config errors ---
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Audit error: {0}")]
    AuditError(String),
}

impl FileVaultError {
    /// Errors that must be answered as an authorization failure rather
    /// than a server error.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::TruncatedCiphertext(_)
                | Self::SessionExpired
                | Self::InvalidCredentials
        )
    }

    /// Errors a caller may retry. Crypto failures are deterministic and
    /// never show up here.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::VisibilityConflict(_))
    }
}

/// Convenience type alias for FileVault results.
pub type Result<T> = std::result::Result<T, FileVaultError>;
