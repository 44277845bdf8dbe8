use std::path::Path;

use trisync_core::config::SyncSettings;
use trisync_core::scheduler::SyncCoordinator;

use crate::commands::common::{build_engine, format_report_lines};
use crate::error::CliError;

pub async fn run_sync(
    settings: &SyncSettings,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let engine = build_engine(settings, data_dir)?;
    let coordinator = SyncCoordinator::new(engine);

    let Some(report) = coordinator.run_now().await else {
        println!("A sync pass is already running.");
        return Ok(());
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_report_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
