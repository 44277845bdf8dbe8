//! trisync - keep three peer databases converged from the command line
//!
//! One binary drives the whole workflow: the long-running service, one-shot
//! passes, conflict inspection and resolution.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use trisync_core::config::SyncSettings;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_data_dir;
use crate::commands::completions::run_completions;
use crate::commands::conflicts::run_conflicts;
use crate::commands::resolve::run_resolve;
use crate::commands::run::run_service;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::view::run_view;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trisync_core=info".parse().unwrap())
                .add_directive("trisync_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir);

    match cli.command {
        Commands::Run => {
            let settings = SyncSettings::from_env()?;
            run_service(&settings, &data_dir).await?;
        }
        Commands::Sync { json } => {
            let settings = SyncSettings::from_env()?;
            run_sync(&settings, json, &data_dir).await?;
        }
        Commands::Status { json } => run_status(json, &data_dir)?,
        Commands::Conflicts {
            status,
            limit,
            json,
        } => run_conflicts(status, limit, json, &data_dir)?,
        Commands::View { token, json } => {
            let settings = SyncSettings::from_env()?;
            run_view(&settings, &token, json, &data_dir)?;
        }
        Commands::Resolve {
            conflict_id,
            peer,
            admin,
            json,
        } => run_resolve(conflict_id, peer, &admin, json, &data_dir)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
