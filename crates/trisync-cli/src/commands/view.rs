use std::path::Path;

use serde::Serialize;
use trisync_core::config::SyncSettings;
use trisync_core::db::SyncStateStore;
use trisync_core::link::ResolutionLinkSigner;
use trisync_core::models::ConflictRecord;

use crate::commands::common::{open_store, version_label};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConflictView<'a> {
    admin: &'a str,
    conflict: &'a ConflictRecord,
}

pub fn run_view(
    settings: &SyncSettings,
    token: &str,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let signer = ResolutionLinkSigner::new(
        settings.link_secret.reveal(),
        settings.link_issuer.clone(),
    );
    let (conflict_id, admin) = signer.parse(token)?;

    let store = open_store(data_dir)?;
    let conflict = store
        .get_conflict(conflict_id)?
        .ok_or(trisync_core::Error::ConflictNotFound(conflict_id))?;

    if as_json {
        let view = ConflictView {
            admin: &admin,
            conflict: &conflict,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Conflict #{} ({})", conflict.conflict_id, conflict.status);
    println!("Table:       {}", conflict.table_name);
    println!("Primary key: {}", conflict.pk_value);
    println!("Detected:    {}", conflict.created_at.to_rfc3339());
    println!("Reviewer:    {admin}");
    println!();
    println!(
        "{} (version {}):",
        conflict.source_db,
        version_label(conflict.source_version),
    );
    println!("{}", pretty_payload(&conflict.source_payload_json));
    println!();
    println!(
        "{} (version {}):",
        conflict.target_db,
        version_label(conflict.target_version),
    );
    match &conflict.target_payload_json {
        Some(payload) => println!("{}", pretty_payload(payload)),
        None => println!("(row missing at detection time)"),
    }
    if let (Some(by), Some(resolution)) = (&conflict.resolved_by, conflict.resolution) {
        println!();
        println!("Resolved by {by}; {resolution} was kept.");
    }
    Ok(())
}

fn pretty_payload(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| raw.to_string())
}
