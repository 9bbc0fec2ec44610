use clap::Parser;
use filevault::cli::{commands, output, Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr: `warn` by default, `debug` with `--verbose`,
/// and `RUST_LOG` overrides both.
fn init_logging(verbose: bool) {
    let default = if verbose { "filevault=debug,warn" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::execute(&cli).await,
        Commands::Register => commands::register::execute(&cli).await,
        Commands::Upload {
            ref files,
            ref path,
            ref name,
            ref content_type,
        } => {
            commands::upload::execute(&cli, files, path, name.as_deref(), content_type.as_deref())
                .await
        }
        Commands::List { ref path } => commands::list::execute(&cli, path).await,
        Commands::Download { ref id, ref output } => {
            commands::download::execute(&cli, id, output.as_deref()).await
        }
        Commands::Preview { ref id } => commands::download::execute_preview(&cli, id).await,
        Commands::Delete { ref id, force } => commands::delete::execute(&cli, id, force).await,
        Commands::Publish { ref id } => commands::publish::execute(&cli, id).await,
        Commands::Unpublish { ref id } => commands::publish::execute_unpublish(&cli, id).await,
        Commands::Fetch {
            ref public_id,
            ref output,
        } => commands::fetch::execute(&cli, public_id, output.as_deref()).await,
        #[cfg(feature = "audit-log")]
        Commands::Audit { last, ref since } => {
            commands::audit_cmd::execute(&cli, last, since.as_deref())
        }
        Commands::Completions { ref shell } => commands::completions::execute(shell),
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        if e.is_authorization_failure() {
            output::tip("Check the user name and password, or log in again.");
        }
        std::process::exit(1);
    }
}
