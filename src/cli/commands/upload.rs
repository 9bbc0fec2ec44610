//! `filevault upload`: encrypt and store local files.

use std::path::{Path, PathBuf};

use crate::cli::output;
use crate::cli::{guess_content_type, open_local_file, Cli, Context};
use crate::errors::{FileVaultError, Result};
use crate::vault::UploadRequest;

/// Execute the `upload` command.  Prints one file id per uploaded file,
/// in argument order.  Stops at the first file that fails.
pub async fn execute(
    cli: &Cli,
    files: &[PathBuf],
    path: &str,
    name: Option<&str>,
    content_type: Option<&str>,
) -> Result<()> {
    if name.is_some() && files.len() > 1 {
        return Err(FileVaultError::CommandFailed(
            "--name can only be used when uploading a single file".into(),
        ));
    }

    let ctx = Context::open(cli).await?;
    let session = ctx.login(cli).await?;

    for file in files {
        let filename = stored_name(file, name)?;
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(&filename));
        let body = open_local_file(file, ctx.settings.chunk_size).await?;

        let stored = ctx
            .vault
            .upload(
                &session,
                UploadRequest {
                    path: path.to_string(),
                    filename,
                    content_type,
                    body,
                },
            )
            .await?;

        ctx.audit(
            "upload",
            Some(session.user_id()),
            Some(stored.id.as_str()),
            Some(&stored.filename),
        );
        output::success(&format!(
            "Uploaded '{}' ({})",
            stored.filename,
            output::format_size(stored.plaintext_len())
        ));
        println!("{}", stored.id);
    }

    Ok(())
}

fn stored_name(file: &Path, name: Option<&str>) -> Result<String> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FileVaultError::CommandFailed(format!("{} has no file name", file.display()))
            }),
    }
}
