//! `filevault register`: create a user.

use crate::auth;
use crate::cli::output;
use crate::cli::{prompt_new_password, require_user, Cli, Context};
use crate::errors::Result;

/// Execute the `register` command.
pub async fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli).await?;
    let user = require_user(cli)?;
    auth::validate_user_id(user)?;

    let password = prompt_new_password()?;
    auth::register(ctx.users.as_ref(), user, &password, &ctx.settings.argon2_params()).await?;

    ctx.audit("register", Some(user), None, None);
    output::success(&format!("Registered user '{user}'"));
    output::tip("Your password derives your file key. If it is lost, your private files cannot be recovered.");

    Ok(())
}
