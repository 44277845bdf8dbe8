//! Replication state: checkpoints and conflict records
//!
//! Kept in a dedicated SQLite database, separate from the peer databases,
//! so that losing or rebuilding a peer never loses the cursor history.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection};

use super::{bad_column, format_instant, format_naive, parse_instant};
use crate::codec;
use crate::error::{Error, Result};
use crate::models::{ConflictRecord, ConflictStatus, NewConflict, PeerId, SyncCheckpoint};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sync_checkpoint (
    source_db      TEXT PRIMARY KEY,
    last_change_id INTEGER NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conflict_record (
    conflict_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name          TEXT NOT NULL,
    pk_value            TEXT NOT NULL,
    source_db           TEXT NOT NULL,
    target_db           TEXT NOT NULL,
    source_version      INTEGER,
    target_version      INTEGER,
    source_updated_at   TEXT,
    target_updated_at   TEXT,
    source_payload_json TEXT NOT NULL,
    target_payload_json TEXT,
    status              TEXT NOT NULL,
    resolved_by         TEXT,
    resolved_at         TEXT,
    resolution          TEXT,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conflict_lookup
    ON conflict_record (table_name, pk_value, status);
";

const CONFLICT_COLUMNS: &str = "conflict_id, table_name, pk_value, source_db, target_db,
    source_version, target_version, source_updated_at, target_updated_at,
    source_payload_json, target_payload_json, status, resolved_by, resolved_at,
    resolution, created_at";

/// Durable replication state shared by the engine and the resolution flow
pub trait SyncStateStore: Send + Sync {
    /// Last committed cursor for a source peer, if any
    fn checkpoint(&self, source: PeerId) -> Result<Option<SyncCheckpoint>>;

    /// Commit the cursor after a fully applied batch
    fn save_checkpoint(&self, source: PeerId, last_change_id: i64) -> Result<()>;

    /// Id of the OPEN conflict already recorded for this row, if any
    fn find_open_conflict(&self, table_name: &str, pk_value: &str) -> Result<Option<i64>>;

    fn insert_conflict(&self, conflict: &NewConflict) -> Result<i64>;

    fn get_conflict(&self, conflict_id: i64) -> Result<Option<ConflictRecord>>;

    fn mark_resolved(&self, conflict_id: i64, resolved_by: &str, resolution: PeerId)
        -> Result<()>;

    /// Most recent conflicts first, optionally filtered by status
    fn list_conflicts(
        &self,
        status: Option<ConflictStatus>,
        limit: usize,
    ) -> Result<Vec<ConflictRecord>>;

    fn count_open_conflicts(&self) -> Result<i64>;
}

/// SQLite implementation of [`SyncStateStore`]
pub struct SqliteSyncStore {
    conn: Mutex<Connection>,
}

impl SqliteSyncStore {
    /// Open (and provision) the state database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory state database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let source_db: String = row.get(3)?;
        let target_db: String = row.get(4)?;
        let source_updated_at: Option<String> = row.get(7)?;
        let target_updated_at: Option<String> = row.get(8)?;
        let status: String = row.get(11)?;
        let resolved_at: Option<String> = row.get(13)?;
        let resolution: Option<String> = row.get(14)?;
        let created_at: String = row.get(15)?;

        Ok(ConflictRecord {
            conflict_id: row.get(0)?,
            table_name: row.get(1)?,
            pk_value: row.get(2)?,
            source_db: source_db.parse().map_err(|e| bad_column(3, e))?,
            target_db: target_db.parse().map_err(|e| bad_column(4, e))?,
            source_version: row.get(5)?,
            target_version: row.get(6)?,
            source_updated_at: source_updated_at.as_deref().and_then(codec::parse_timestamp),
            target_updated_at: target_updated_at.as_deref().and_then(codec::parse_timestamp),
            source_payload_json: row.get(9)?,
            target_payload_json: row.get(10)?,
            status: status.parse().map_err(|e| bad_column(11, e))?,
            resolved_by: row.get(12)?,
            resolved_at: resolved_at.as_deref().and_then(parse_instant),
            resolution: resolution
                .map(|s| s.parse().map_err(|e| bad_column(14, e)))
                .transpose()?,
            created_at: parse_instant(&created_at)
                .ok_or_else(|| bad_column(15, Error::InvalidRecord(created_at.clone())))?,
        })
    }
}

impl SyncStateStore for SqliteSyncStore {
    fn checkpoint(&self, source: PeerId) -> Result<Option<SyncCheckpoint>> {
        match self.conn().query_row(
            "SELECT last_change_id, updated_at FROM sync_checkpoint WHERE source_db = ?1",
            params![source.as_str()],
            |row| {
                let last_change_id: i64 = row.get(0)?;
                let updated_at: String = row.get(1)?;
                Ok((last_change_id, updated_at))
            },
        ) {
            Ok((last_change_id, updated_at)) => Ok(Some(SyncCheckpoint {
                source_db: source,
                last_change_id,
                updated_at: parse_instant(&updated_at)
                    .ok_or_else(|| Error::InvalidRecord(updated_at.clone()))?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save_checkpoint(&self, source: PeerId, last_change_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_checkpoint (source_db, last_change_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(source_db) DO UPDATE SET last_change_id = ?2, updated_at = ?3",
            params![source.as_str(), last_change_id, format_instant(Utc::now())],
        )?;
        Ok(())
    }

    fn find_open_conflict(&self, table_name: &str, pk_value: &str) -> Result<Option<i64>> {
        match self.conn().query_row(
            "SELECT conflict_id FROM conflict_record
             WHERE table_name = ?1 AND pk_value = ?2 AND status = 'OPEN'
             ORDER BY conflict_id DESC
             LIMIT 1",
            params![table_name, pk_value],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn insert_conflict(&self, conflict: &NewConflict) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conflict_record (
                 table_name, pk_value, source_db, target_db,
                 source_version, target_version, source_updated_at, target_updated_at,
                 source_payload_json, target_payload_json, status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                conflict.table_name,
                conflict.pk_value,
                conflict.source_db.as_str(),
                conflict.target_db.as_str(),
                conflict.source_version,
                conflict.target_version,
                conflict.source_updated_at.map(format_naive),
                conflict.target_updated_at.map(format_naive),
                conflict.source_payload_json,
                conflict.target_payload_json,
                ConflictStatus::Open.as_str(),
                format_instant(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_conflict(&self, conflict_id: i64) -> Result<Option<ConflictRecord>> {
        let sql = format!("SELECT {CONFLICT_COLUMNS} FROM conflict_record WHERE conflict_id = ?1");
        match self
            .conn()
            .query_row(&sql, params![conflict_id], Self::parse_conflict)
        {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn mark_resolved(
        &self,
        conflict_id: i64,
        resolved_by: &str,
        resolution: PeerId,
    ) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE conflict_record
             SET status = 'RESOLVED', resolved_by = ?2, resolved_at = ?3, resolution = ?4
             WHERE conflict_id = ?1",
            params![
                conflict_id,
                resolved_by,
                format_instant(Utc::now()),
                resolution.as_str()
            ],
        )?;
        if updated == 0 {
            return Err(Error::ConflictNotFound(conflict_id));
        }
        Ok(())
    }

    fn list_conflicts(
        &self,
        status: Option<ConflictStatus>,
        limit: usize,
    ) -> Result<Vec<ConflictRecord>> {
        let conn = self.conn();
        let records = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflict_record
                     WHERE status = ?1
                     ORDER BY conflict_id DESC
                     LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows =
                    stmt.query_map(params![status.as_str(), limit as i64], Self::parse_conflict)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflict_record
                     ORDER BY conflict_id DESC
                     LIMIT ?1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit as i64], Self::parse_conflict)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }

    fn count_open_conflicts(&self) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM conflict_record WHERE status = 'OPEN'",
            [],
            |row| row.get(0),
        )?)
    }
}
