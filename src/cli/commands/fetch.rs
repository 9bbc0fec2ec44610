//! `filevault fetch`: read a public file by its public id.

use std::path::Path;

use crate::cli::output;
use crate::cli::{write_body, Cli, Context};
use crate::errors::Result;
use crate::vault::PublicId;

/// Execute the `fetch` command.  No user or password is involved.
pub async fn execute(cli: &Cli, public_id: &str, output_path: Option<&Path>) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let public_id = PublicId::parse(public_id)?;

    let content = ctx.vault.fetch_public(&public_id).await?;
    let file_id = content.file.id.clone();
    let filename = content.file.filename.clone();
    let written = write_body(content.body, output_path).await?;

    ctx.audit("fetch", None, Some(file_id.as_str()), None);
    if let Some(path) = output_path {
        output::success(&format!(
            "Saved '{filename}' to {} ({})",
            path.display(),
            output::format_size(written)
        ));
    }
    Ok(())
}
