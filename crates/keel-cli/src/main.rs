//! keel - a dependency-aware package installer

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use keel_cli::cmd::{self, Session};
use keel_cli::{Cli, Commands, Exit};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            Exit::Error.into()
        }
    }
}

async fn run(cli: Cli) -> Result<Exit> {
    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(Exit::Success);
    }

    let session = Session::new(cli.home, cli.registry, cli.quiet)?;

    match cli.command {
        Commands::Install {
            packages,
            parallel,
            rollback_orphans,
        } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\ninterrupted; finishing the current package");
                    on_signal.cancel();
                }
            });
            cmd::install::install(&session, &packages, parallel, rollback_orphans, &cancel).await
        }
        Commands::Resolve { packages, dry_run } => {
            cmd::resolve::resolve(&session, &packages, dry_run).await
        }
        Commands::Uninstall { package, force } => {
            cmd::uninstall::uninstall(&session, &package, force).await
        }
        Commands::List { json } => cmd::list::list(&session, json).await,
        Commands::Info { package } => cmd::info::info(&session, &package).await,
        Commands::History { package } => cmd::history::history(&session, &package).await,
        Commands::Test { package } => cmd::test::test(&session, &package).await,
        Commands::Update { url } => cmd::update::update(&session, url.as_deref()).await,
        Commands::Completions { .. } => Ok(Exit::Success),
    }
}
