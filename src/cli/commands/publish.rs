//! `filevault publish` / `filevault unpublish`: toggle a file's public link.

use crate::cli::output;
use crate::cli::{Cli, Context};
use crate::errors::Result;
use crate::vault::FileId;

/// Execute the `publish` command.  Prints the new public id on stdout.
pub async fn execute(cli: &Cli, id: &str) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let id = FileId::parse(id)?;
    let session = ctx.login(cli).await?;

    let public_id = ctx.vault.make_public(&session, &id).await?;

    ctx.audit("publish", Some(session.user_id()), Some(id.as_str()), None);
    output::success(&format!("File {id} is now public"));
    output::tip("Anyone with the public id can run `filevault fetch <PUBLIC_ID>`.");
    println!("{public_id}");
    Ok(())
}

/// Execute the `unpublish` command.
pub async fn execute_unpublish(cli: &Cli, id: &str) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let id = FileId::parse(id)?;
    let session = ctx.login(cli).await?;

    ctx.vault.make_private(&session, &id).await?;

    ctx.audit("unpublish", Some(session.user_id()), Some(id.as_str()), None);
    output::success(&format!("File {id} is private again; its public link no longer works"));
    Ok(())
}
