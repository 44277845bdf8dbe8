use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Duration, Utc};
use serde_json::Number;
use trisync_core::codec;
use trisync_core::config::SyncSettings;
use trisync_core::db::{ChangeCapture, Peer, SyncStateStore};
use trisync_core::link::ResolutionLinkSigner;
use trisync_core::models::{
    CanonicalRow, ConflictRecord, ConflictStatus, FieldValue, NewConflict, PeerId, TableKind,
};

use crate::cli::{CompletionShell, PeerChoice, StatusFilter};
use crate::commands::common::{
    conflict_status, conflict_to_item, format_conflict_lines, format_relative_time,
    format_report_lines, open_peers, open_store, peer_id, resolve_data_dir, version_label,
};
use crate::commands::completions::run_completions;
use crate::commands::conflicts::run_conflicts;
use crate::commands::resolve::run_resolve;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::view::run_view;
use crate::error::CliError;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn test_settings() -> SyncSettings {
    SyncSettings::from_lookup(|name| match name {
        "TRISYNC_LINK_SECRET" => Some(SECRET.to_string()),
        _ => None,
    })
    .unwrap()
}

fn unique_test_data_dir() -> PathBuf {
    static NEXT_TEST_DIR_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_DIR_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("trisync-cli-test-{timestamp}-{sequence}"))
}

fn cleanup_data_dir(dir: &PathBuf) {
    let _ = std::fs::remove_dir_all(dir);
}

fn product_row(pk: i64, version: i64, name: &str) -> CanonicalRow {
    let mut row = CanonicalRow::new();
    row.insert("productId", FieldValue::Number(Number::from(pk)));
    row.insert("productName", FieldValue::Text(name.to_string()));
    row.insert("version", FieldValue::Number(Number::from(version)));
    row.insert(
        "updatedAt",
        FieldValue::Timestamp(codec::parse_timestamp("2024-01-01 10:00:00").unwrap()),
    );
    row
}

fn sample_conflict(pk: i64) -> NewConflict {
    NewConflict {
        table_name: "product_info".to_string(),
        pk_value: pk.to_string(),
        source_db: PeerId::Mysql,
        target_db: PeerId::Postgres,
        source_version: Some(3),
        target_version: Some(5),
        source_updated_at: None,
        target_updated_at: None,
        source_payload_json: format!("{{\"productId\":{pk}}}"),
        target_payload_json: Some(format!("{{\"productId\":{pk}}}")),
    }
}

#[test]
fn resolve_data_dir_prefers_cli_flag() {
    let dir = resolve_data_dir(Some(PathBuf::from("/tmp/custom-sync")));
    assert_eq!(dir, PathBuf::from("/tmp/custom-sync"));
}

#[test]
fn peer_id_maps_every_choice() {
    assert_eq!(peer_id(PeerChoice::Mysql), PeerId::Mysql);
    assert_eq!(peer_id(PeerChoice::Postgres), PeerId::Postgres);
    assert_eq!(peer_id(PeerChoice::Sqlserver), PeerId::SqlServer);
}

#[test]
fn conflict_status_maps_filters() {
    assert_eq!(conflict_status(StatusFilter::Open), ConflictStatus::Open);
    assert_eq!(
        conflict_status(StatusFilter::Resolved),
        ConflictStatus::Resolved
    );
}

#[test]
fn version_label_handles_missing_versions() {
    assert_eq!(version_label(Some(12)), "12");
    assert_eq!(version_label(None), "?");
}

#[test]
fn format_relative_time_units() {
    let now = Utc::now();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
}

#[test]
fn conflict_to_item_carries_resolution_fields() {
    let record = ConflictRecord {
        conflict_id: 41,
        table_name: "product_info".to_string(),
        pk_value: "7".to_string(),
        source_db: PeerId::Mysql,
        target_db: PeerId::Postgres,
        source_version: Some(3),
        target_version: Some(5),
        source_updated_at: None,
        target_updated_at: None,
        source_payload_json: "{}".to_string(),
        target_payload_json: None,
        status: ConflictStatus::Resolved,
        resolved_by: Some("dba".to_string()),
        resolved_at: Some(Utc::now()),
        resolution: Some(PeerId::Postgres),
        created_at: Utc::now() - Duration::minutes(5),
    };

    let item = conflict_to_item(&record);
    assert_eq!(item.conflict_id, 41);
    assert_eq!(item.source_db, "MYSQL");
    assert_eq!(item.target_db, "POSTGRES");
    assert_eq!(item.status, "RESOLVED");
    assert_eq!(item.detected_relative, "5m ago");
    assert_eq!(item.resolved_by.as_deref(), Some("dba"));
    assert_eq!(item.resolution.as_deref(), Some("POSTGRES"));
}

#[test]
fn format_conflict_lines_show_the_flow() {
    let record = ConflictRecord {
        conflict_id: 8,
        table_name: "order_info".to_string(),
        pk_value: "1001".to_string(),
        source_db: PeerId::Postgres,
        target_db: PeerId::SqlServer,
        source_version: Some(2),
        target_version: None,
        source_updated_at: None,
        target_updated_at: None,
        source_payload_json: "{}".to_string(),
        target_payload_json: None,
        status: ConflictStatus::Open,
        resolved_by: None,
        resolved_at: None,
        resolution: None,
        created_at: Utc::now(),
    };

    let lines = format_conflict_lines(&[record]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("#8"));
    assert!(lines[0].contains("order_info"));
    assert!(lines[0].contains("pk=1001"));
    assert!(lines[0].contains("POSTGRES v2 -> SQLSERVER v?"));
    assert!(lines[0].contains("OPEN"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_command_converges_a_fresh_data_dir() {
    let data_dir = unique_test_data_dir();
    {
        let peers = open_peers(&data_dir).unwrap();
        peers
            .get(PeerId::Mysql)
            .upsert_row(
                TableKind::Product,
                &product_row(1, 1, "Widget"),
                ChangeCapture::Normal,
            )
            .unwrap();
    }

    run_sync(&test_settings(), true, &data_dir).await.unwrap();

    let peers = open_peers(&data_dir).unwrap();
    let meta = peers
        .get(PeerId::Postgres)
        .get_row_meta(TableKind::Product, 1)
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(1));

    let store = open_store(&data_dir).unwrap();
    let checkpoint = store.checkpoint(PeerId::Mysql).unwrap().unwrap();
    assert!(checkpoint.last_change_id >= 1);

    run_status(false, &data_dir).unwrap();
    cleanup_data_dir(&data_dir);
}

#[test]
fn resolve_command_closes_an_open_conflict() {
    let data_dir = unique_test_data_dir();
    let peers = open_peers(&data_dir).unwrap();
    peers
        .get(PeerId::Mysql)
        .upsert_row(
            TableKind::Product,
            &product_row(7, 3, "Stale"),
            ChangeCapture::Normal,
        )
        .unwrap();
    peers
        .get(PeerId::Postgres)
        .upsert_row(
            TableKind::Product,
            &product_row(7, 5, "Fresh"),
            ChangeCapture::Normal,
        )
        .unwrap();

    let store = open_store(&data_dir).unwrap();
    let conflict_id = store.insert_conflict(&sample_conflict(7)).unwrap();

    run_resolve(conflict_id, PeerChoice::Postgres, "dba", false, &data_dir).unwrap();

    let record = store.get_conflict(conflict_id).unwrap().unwrap();
    assert!(record.is_resolved());
    assert_eq!(record.resolved_by.as_deref(), Some("dba"));

    // max version across peers was 5, so the reconciled row carries 6
    let meta = peers
        .get(PeerId::Mysql)
        .get_row_meta(TableKind::Product, 7)
        .unwrap()
        .unwrap();
    assert_eq!(meta.version, Some(6));

    cleanup_data_dir(&data_dir);
}

#[test]
fn resolve_command_rejects_unknown_conflict() {
    let data_dir = unique_test_data_dir();

    let error = run_resolve(999, PeerChoice::Mysql, "dba", false, &data_dir).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(trisync_core::Error::ConflictNotFound(999))
    ));

    cleanup_data_dir(&data_dir);
}

#[test]
fn view_command_accepts_signed_tokens_only() {
    let data_dir = unique_test_data_dir();
    let store = open_store(&data_dir).unwrap();
    let conflict_id = store.insert_conflict(&sample_conflict(9)).unwrap();

    let settings = test_settings();
    let signer = ResolutionLinkSigner::new(
        settings.link_secret.reveal(),
        settings.link_issuer.clone(),
    );

    let token = signer.generate(conflict_id, "dba").unwrap();
    run_view(&settings, &token, true, &data_dir).unwrap();

    let missing = signer.generate(12345, "dba").unwrap();
    let error = run_view(&settings, &missing, false, &data_dir).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(trisync_core::Error::ConflictNotFound(12345))
    ));

    let error = run_view(&settings, "not-a-token", false, &data_dir).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(trisync_core::Error::Token(_))
    ));

    cleanup_data_dir(&data_dir);
}

#[test]
fn conflicts_command_lists_and_filters() {
    let data_dir = unique_test_data_dir();
    let store = open_store(&data_dir).unwrap();

    run_conflicts(None, 10, false, &data_dir).unwrap();

    store.insert_conflict(&sample_conflict(3)).unwrap();
    run_conflicts(Some(StatusFilter::Open), 10, true, &data_dir).unwrap();
    run_conflicts(Some(StatusFilter::Resolved), 10, false, &data_dir).unwrap();

    cleanup_data_dir(&data_dir);
}

#[test]
fn run_completions_writes_bash_script_file() {
    let output_path = std::env::temp_dir().join(format!(
        "trisync-completions-test-{}.bash",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos())
    ));

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_trisync()"));
    assert!(script.contains("complete -F _trisync"));

    let _ = std::fs::remove_file(output_path);
}

#[test]
fn format_report_lines_include_errors() {
    use trisync_core::engine::{SourceReport, SyncReport};

    let report = SyncReport {
        sources: vec![
            SourceReport {
                source: PeerId::Mysql,
                fetched: 2,
                applied: 4,
                conflicts: 0,
                skipped: 0,
                cursor: 12,
                error: None,
            },
            SourceReport {
                source: PeerId::Postgres,
                fetched: 1,
                applied: 0,
                conflicts: 0,
                skipped: 0,
                cursor: 3,
                error: Some("peer offline".to_string()),
            },
        ],
    };

    let lines = format_report_lines(&report);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("MYSQL"));
    assert!(lines[0].contains("applied=4"));
    assert!(lines[1].contains("error: peer offline"));
    assert!(lines[2].contains("Applied 4 change(s)"));
}
