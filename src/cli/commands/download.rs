//! `filevault download` / `filevault preview`: decrypt a file you own.

use std::path::Path;

use crate::cli::output;
use crate::cli::{write_body, Cli, Context};
use crate::errors::Result;
use crate::vault::FileId;

/// Execute the `download` command.
pub async fn execute(cli: &Cli, id: &str, output_path: Option<&Path>) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let id = FileId::parse(id)?;
    let session = ctx.login(cli).await?;

    let content = ctx.vault.download(&session, &id).await?;
    let filename = content.file.filename.clone();
    let written = write_body(content.body, output_path).await?;

    if let Some(path) = output_path {
        output::success(&format!(
            "Saved '{filename}' to {} ({})",
            path.display(),
            output::format_size(written)
        ));
    }
    Ok(())
}

/// Execute the `preview` command: plaintext straight to stdout.
pub async fn execute_preview(cli: &Cli, id: &str) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let id = FileId::parse(id)?;
    let session = ctx.login(cli).await?;

    let content = ctx.vault.preview(&session, &id).await?;
    write_body(content.body, None).await?;
    Ok(())
}
