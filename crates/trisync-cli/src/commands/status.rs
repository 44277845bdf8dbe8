use std::path::Path;

use serde::Serialize;
use trisync_core::db::SyncStateStore;
use trisync_core::models::PeerId;

use crate::commands::common::open_store;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusView {
    checkpoints: Vec<CheckpointItem>,
    open_conflicts: i64,
}

#[derive(Debug, Serialize)]
struct CheckpointItem {
    source_db: String,
    last_change_id: i64,
    updated_at: Option<String>,
}

pub fn run_status(as_json: bool, data_dir: &Path) -> Result<(), CliError> {
    let store = open_store(data_dir)?;

    let mut checkpoints = Vec::with_capacity(PeerId::SOURCES.len());
    for source in PeerId::SOURCES {
        let checkpoint = store.checkpoint(source)?;
        checkpoints.push(CheckpointItem {
            source_db: source.to_string(),
            last_change_id: checkpoint.map_or(0, |c| c.last_change_id),
            updated_at: checkpoint.map(|c| c.updated_at.to_rfc3339()),
        });
    }
    let open_conflicts = store.count_open_conflicts()?;

    if as_json {
        let view = StatusView {
            checkpoints,
            open_conflicts,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    for item in &checkpoints {
        match &item.updated_at {
            Some(at) => println!(
                "{:<9}  last_change_id={:<8}  updated {at}",
                item.source_db, item.last_change_id,
            ),
            None => println!("{:<9}  never synced", item.source_db),
        }
    }
    println!("Open conflicts: {open_conflicts}");
    Ok(())
}
