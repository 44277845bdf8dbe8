use std::path::Path;

use trisync_core::config::SyncSettings;
use trisync_core::scheduler::SyncCoordinator;

use crate::commands::common::build_engine;
use crate::error::CliError;

pub async fn run_service(settings: &SyncSettings, data_dir: &Path) -> Result<(), CliError> {
    let engine = build_engine(settings, data_dir)?;
    if settings.mail.is_none() {
        tracing::info!("Mail settings absent; conflict notifications go to the log");
    }
    let coordinator = SyncCoordinator::new(engine);
    coordinator.start(settings);

    println!("trisync is running (data dir: {})", data_dir.display());
    println!("Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    println!("Shutting down...");
    coordinator.shutdown().await;
    Ok(())
}
