//! `filevault list`: display a folder's files in a table.

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::Result;

/// Execute the `list` command.
pub async fn execute(cli: &Cli, path: &str) -> Result<()> {
    let ctx = Context::open(cli).await?;
    // The password check authenticates the caller; listing itself
    // reads metadata only.
    let session = ctx.login(cli).await?;

    let files = ctx.vault.list_files(&session, path).await?;

    output::info(&format!("{path} — {} file(s)", files.len()));
    output::print_files_table(&files);

    Ok(())
}
