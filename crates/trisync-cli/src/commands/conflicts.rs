use std::path::Path;

use trisync_core::db::SyncStateStore;

use crate::cli::StatusFilter;
use crate::commands::common::{
    conflict_status, conflict_to_item, format_conflict_lines, open_store, ConflictListItem,
};
use crate::error::CliError;

pub fn run_conflicts(
    status: Option<StatusFilter>,
    limit: usize,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let store = open_store(data_dir)?;
    let records = store.list_conflicts(status.map(conflict_status), limit)?;

    if as_json {
        let json_items = records
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&records) {
        println!("{line}");
    }
    Ok(())
}
