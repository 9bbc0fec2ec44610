//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use futures::stream::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use zeroize::Zeroizing;

use crate::auth::{self, Session, MIN_PASSWORD_LEN};
use crate::config::Settings;
use crate::errors::{FileVaultError, Result};
use crate::storage::{BlobStream, ByteStream, FsBlobStore, JsonFileIndex, JsonUserDirectory, UserDirectory};
use crate::vault::{FileVault, VaultOptions};

/// Environment variable read before prompting for a password.
pub const PASSWORD_ENV: &str = "FILEVAULT_PASSWORD";

/// FileVault CLI: encrypted multi-user file store.
#[derive(Parser)]
#[command(
    name = "filevault",
    about = "Encrypted file store with per-file keys and public links",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (overrides `data_dir` in filevault.toml)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// User to act as
    #[arg(short, long, env = "FILEVAULT_USER", global = true)]
    pub user: Option<String>,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create the data directory, a default config and the server key
    Init,

    /// Register a new user
    Register,

    /// Encrypt and store one or more local files
    Upload {
        /// Local files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Folder to place the files in
        #[arg(short, long, default_value = "/")]
        path: String,
        /// Stored filename (defaults to the local file name; single file only)
        #[arg(long)]
        name: Option<String>,
        /// Content type (guessed from the extension if omitted)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// List your files in a folder
    List {
        /// Folder to list
        #[arg(short, long, default_value = "/")]
        path: String,
    },

    /// Decrypt a file to disk or stdout
    Download {
        /// File id
        id: String,
        /// Output file path (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt a file to stdout for viewing
    Preview {
        /// File id
        id: String,
    },

    /// Delete a file
    Delete {
        /// File id
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Make a file reachable through a public link
    Publish {
        /// File id
        id: String,
    },

    /// Withdraw a file's public link
    Unpublish {
        /// File id
        id: String,
    },

    /// Fetch a public file (no login needed)
    Fetch {
        /// Public id
        public_id: String,
        /// Output file path (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// View the audit log
    #[cfg(feature = "audit-log")]
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Settings from `<cwd>/filevault.toml` with `--data-dir` applied.
pub fn load_settings(cli: &Cli) -> Result<(PathBuf, Settings)> {
    let cwd = std::env::current_dir()
        .map_err(|e| FileVaultError::ConfigError(format!("cannot read working directory: {e}")))?;
    let mut settings = Settings::load(&cwd)?;
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    Ok((cwd, settings))
}

/// Everything a command needs once the store is initialised.
pub struct Context {
    pub settings: Settings,
    pub data_dir: PathBuf,
    pub users: Arc<dyn UserDirectory>,
    pub vault: FileVault,
}

impl Context {
    /// Load settings and the server key, then build the stores once.
    pub async fn open(cli: &Cli) -> Result<Self> {
        let (cwd, settings) = load_settings(cli)?;
        let server_key = Arc::new(settings.load_server_key(&cwd)?);
        let data_dir = settings.data_path(&cwd);

        let blobs = Arc::new(FsBlobStore::open(&data_dir, settings.chunk_size).await?);
        let index = Arc::new(JsonFileIndex::open(&data_dir).await?);
        let users = Arc::new(JsonUserDirectory::open(&data_dir).await?);

        let vault = FileVault::new(
            blobs,
            index,
            server_key,
            VaultOptions {
                release_policy: settings.release_policy,
                chunk_size: settings.chunk_size,
            },
        );

        Ok(Self {
            settings,
            data_dir,
            users,
            vault,
        })
    }

    /// Prompt for the `--user` password and derive a session.
    pub async fn login(&self, cli: &Cli) -> Result<Session> {
        let user = require_user(cli)?;
        let password = prompt_password(user)?;
        auth::login(
            self.users.as_ref(),
            user,
            &password,
            &self.settings.argon2_params(),
            self.settings.session_ttl(),
        )
        .await
    }

    /// Record an audit event.  No-op without the `audit-log` feature.
    pub fn audit(&self, operation: &str, user: Option<&str>, file: Option<&str>, details: Option<&str>) {
        #[cfg(feature = "audit-log")]
        crate::audit::log_audit(&self.data_dir, operation, user, file, details);

        #[cfg(not(feature = "audit-log"))]
        let _ = (operation, user, file, details);
    }
}

/// The `--user` argument, required by every per-user command.
pub fn require_user(cli: &Cli) -> Result<&str> {
    cli.user.as_deref().ok_or_else(|| {
        FileVaultError::CommandFailed("no user given; pass --user or set FILEVAULT_USER".into())
    })
}

/// Get a user's password, trying in order:
/// 1. `FILEVAULT_PASSWORD` env var (scripts and CI)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_password(user: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(format!("Password for {user}"))
        .interact()
        .map_err(|e| FileVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation (used by `register`).
///
/// Also respects `FILEVAULT_PASSWORD` for scripted usage.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(FileVaultError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose a password")
            .with_confirmation("Confirm password", "Passwords do not match, try again")
            .interact()
            .map_err(|e| FileVaultError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Stream a local file in `chunk_size` reads.
pub async fn open_local_file(path: &Path, chunk_size: usize) -> Result<BlobStream<'static>> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        FileVaultError::CommandFailed(format!("cannot open {}: {e}", path.display()))
    })?;
    Ok(ReaderStream::with_capacity(file, chunk_size.max(1)).boxed())
}

/// Write a decrypted stream to `output` (atomically) or to stdout.
///
/// When writing to a file nothing is left behind if the stream fails.
pub async fn write_body(body: ByteStream<'static>, output: Option<&Path>) -> Result<u64> {
    match output {
        Some(path) => {
            let parent = path.parent().unwrap_or(Path::new("."));
            let tmp_path = parent.join(format!(
                ".{}.part",
                path.file_name().unwrap_or_default().to_string_lossy()
            ));

            let disk_error = |e: std::io::Error| {
                FileVaultError::StorageError(format!("{}: {e}", tmp_path.display()))
            };
            let mut file = tokio::fs::File::create(&tmp_path).await.map_err(disk_error)?;
            match copy_stream(body, &mut file).await {
                Ok(written) => {
                    file.sync_all().await.map_err(disk_error)?;
                    tokio::fs::rename(&tmp_path, path).await.map_err(disk_error)?;
                    Ok(written)
                }
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    Err(e)
                }
            }
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let written = copy_stream(body, &mut stdout).await?;
            stdout.flush().await?;
            Ok(written)
        }
    }
}

async fn copy_stream<W>(mut body: ByteStream<'static>, out: &mut W) -> Result<u64>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

/// Best-effort content type from a file extension.
pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string()
}
