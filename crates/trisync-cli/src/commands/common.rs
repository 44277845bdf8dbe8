use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trisync_core::config::SyncSettings;
use trisync_core::db::{PeerSet, SqlitePeer, SqliteSyncStore};
use trisync_core::engine::{SyncEngine, SyncReport};
use trisync_core::link::ResolutionLinkSigner;
use trisync_core::models::{ConflictRecord, ConflictStatus, PeerId};
use trisync_core::notify::LogNotifier;
use trisync_core::resolve::ConflictResolver;

use crate::cli::{PeerChoice, StatusFilter};
use crate::error::CliError;

const MYSQL_DB_FILE: &str = "mysql.db";
const POSTGRES_DB_FILE: &str = "postgres.db";
const SQLSERVER_DB_FILE: &str = "sqlserver.db";
const STATE_DB_FILE: &str = "sync-state.db";

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> PathBuf {
    cli_data_dir
        .or_else(|| env::var_os("TRISYNC_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(default_data_dir)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trisync")
}

/// Open (and provision) the three peer databases under `data_dir`
pub fn open_peers(data_dir: &Path) -> Result<PeerSet, CliError> {
    std::fs::create_dir_all(data_dir)?;
    let mysql = SqlitePeer::open(PeerId::Mysql, data_dir.join(MYSQL_DB_FILE))?;
    let postgres = SqlitePeer::open(PeerId::Postgres, data_dir.join(POSTGRES_DB_FILE))?;
    let sqlserver = SqlitePeer::open(PeerId::SqlServer, data_dir.join(SQLSERVER_DB_FILE))?;
    Ok(PeerSet::new(
        Arc::new(mysql),
        Arc::new(postgres),
        Arc::new(sqlserver),
    ))
}

/// Open (and provision) the replication state database under `data_dir`
pub fn open_store(data_dir: &Path) -> Result<Arc<SqliteSyncStore>, CliError> {
    std::fs::create_dir_all(data_dir)?;
    Ok(Arc::new(SqliteSyncStore::open(data_dir.join(STATE_DB_FILE))?))
}

pub fn build_engine(
    settings: &SyncSettings,
    data_dir: &Path,
) -> Result<Arc<SyncEngine>, CliError> {
    let peers = open_peers(data_dir)?;
    let store = open_store(data_dir)?;
    let signer = ResolutionLinkSigner::new(
        settings.link_secret.reveal(),
        settings.link_issuer.clone(),
    );
    Ok(Arc::new(SyncEngine::new(
        peers,
        store,
        Arc::new(LogNotifier),
        signer,
        settings.mail.clone(),
        settings.batch_size,
    )))
}

pub fn build_resolver(data_dir: &Path) -> Result<ConflictResolver, CliError> {
    let peers = open_peers(data_dir)?;
    let store = open_store(data_dir)?;
    Ok(ConflictResolver::new(peers, store))
}

pub const fn peer_id(choice: PeerChoice) -> PeerId {
    match choice {
        PeerChoice::Mysql => PeerId::Mysql,
        PeerChoice::Postgres => PeerId::Postgres,
        PeerChoice::Sqlserver => PeerId::SqlServer,
    }
}

pub const fn conflict_status(filter: StatusFilter) -> ConflictStatus {
    match filter {
        StatusFilter::Open => ConflictStatus::Open,
        StatusFilter::Resolved => ConflictStatus::Resolved,
    }
}

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub conflict_id: i64,
    pub table_name: String,
    pub pk_value: String,
    pub source_db: String,
    pub target_db: String,
    pub source_version: Option<i64>,
    pub target_version: Option<i64>,
    pub status: String,
    pub detected_at: String,
    pub detected_relative: String,
    pub resolved_by: Option<String>,
    pub resolution: Option<String>,
}

pub fn conflict_to_item(record: &ConflictRecord) -> ConflictListItem {
    let now = Utc::now();
    ConflictListItem {
        conflict_id: record.conflict_id,
        table_name: record.table_name.clone(),
        pk_value: record.pk_value.clone(),
        source_db: record.source_db.to_string(),
        target_db: record.target_db.to_string(),
        source_version: record.source_version,
        target_version: record.target_version,
        status: record.status.to_string(),
        detected_at: record.created_at.to_rfc3339(),
        detected_relative: format_relative_time(record.created_at, now),
        resolved_by: record.resolved_by.clone(),
        resolution: record.resolution.map(|peer| peer.to_string()),
    }
}

pub fn format_conflict_lines(records: &[ConflictRecord]) -> Vec<String> {
    let now = Utc::now();
    records
        .iter()
        .map(|record| {
            let id = format!("#{}", record.conflict_id);
            let pk = format!("pk={}", record.pk_value);
            let flow = format!(
                "{} v{} -> {} v{}",
                record.source_db,
                version_label(record.source_version),
                record.target_db,
                version_label(record.target_version),
            );
            let status = record.status.to_string();
            let when = format_relative_time(record.created_at, now);
            format!(
                "{id:<7}  {table:<14}  {pk:<14}  {flow:<28}  {status:<8}  {when}",
                table = record.table_name,
            )
        })
        .collect()
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.sources.len() + 1);
    for source in &report.sources {
        let name = source.source.to_string();
        let mut line = format!(
            "{name:<9}  fetched={} applied={} conflicts={} skipped={} cursor={}",
            source.fetched, source.applied, source.conflicts, source.skipped, source.cursor,
        );
        if let Some(error) = &source.error {
            line.push_str(&format!("  error: {error}"));
        }
        lines.push(line);
    }
    lines.push(format!(
        "Applied {} change(s), {} conflict(s) recorded",
        report.total_applied(),
        report.total_conflicts(),
    ));
    lines
}

pub fn version_label(version: Option<i64>) -> String {
    version.map_or_else(|| "?".to_string(), |v| v.to_string())
}

pub fn format_relative_time(instant: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(instant).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
