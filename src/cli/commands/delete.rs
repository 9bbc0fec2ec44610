//! `filevault delete`: remove a file and its ciphertext.

use dialoguer::Confirm;

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::{FileVaultError, Result};
use crate::vault::FileId;

/// Execute the `delete` command.
pub async fn execute(cli: &Cli, id: &str, force: bool) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let id = FileId::parse(id)?;

    // Unless --force is set, ask for confirmation before deleting.
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete file {id}?"))
            .default(false)
            .interact()
            .map_err(|e| FileVaultError::CommandFailed(format!("confirm prompt: {e}")))?;

        if !confirmed {
            output::info("Cancelled.");
            return Ok(());
        }
    }

    let session = ctx.login(cli).await?;
    let removed = ctx.vault.delete_file(&session, &id).await?;

    ctx.audit("delete", Some(session.user_id()), Some(id.as_str()), Some(&removed.filename));
    output::success(&format!("Deleted '{}'", removed.filename));
    Ok(())
}
