use std::path::Path;

use crate::cli::PeerChoice;
use crate::commands::common::{build_resolver, peer_id};
use crate::error::CliError;

pub fn run_resolve(
    conflict_id: i64,
    peer: PeerChoice,
    admin: &str,
    as_json: bool,
    data_dir: &Path,
) -> Result<(), CliError> {
    let resolver = build_resolver(data_dir)?;
    let resolution = resolver.resolve(conflict_id, peer_id(peer), admin)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    let targets = resolution
        .propagated_to
        .map(|target| target.to_string())
        .join(", ");
    println!(
        "Conflict #{} resolved: {} pk={} now follows {} at version {} (written to {})",
        resolution.conflict_id,
        resolution.table_name,
        resolution.pk_value,
        resolution.authoritative_db,
        resolution.final_version,
        targets,
    );
    Ok(())
}
