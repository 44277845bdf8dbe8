//! SQLite-backed peer implementation
//!
//! One database file per peer, holding the replicated business tables, an
//! append-only `change_log` with capture triggers, and a one-row
//! `change_capture` flag consulted by those triggers. The UPDATE triggers
//! skip writes that leave `version` and `updated_at` unchanged, so engine
//! replays of already-applied rows do not append new change-log entries.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, params_from_iter, Connection};

use super::peer::{ChangeCapture, Peer};
use super::{bad_column, format_naive, parse_instant};
use crate::codec;
use crate::error::{Error, Result};
use crate::models::{
    CanonicalRow, ChangeLogEntry, FieldValue, PeerId, RowMeta, TableKind,
};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS product_info (
    product_id   INTEGER PRIMARY KEY,
    product_name TEXT,
    category_id  INTEGER,
    supplier_id  INTEGER,
    price        REAL,
    stock        INTEGER,
    description  TEXT,
    listed_at    TEXT,
    version      INTEGER,
    updated_at   TEXT,
    deleted      INTEGER
);

CREATE TABLE IF NOT EXISTS order_info (
    order_id         INTEGER PRIMARY KEY,
    user_id          INTEGER,
    product_id       INTEGER,
    quantity         INTEGER,
    order_status     TEXT,
    ordered_at       TEXT,
    shipping_address TEXT,
    version          INTEGER,
    updated_at       TEXT,
    deleted          INTEGER
);

CREATE TABLE IF NOT EXISTS change_log (
    change_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    db_code        TEXT NOT NULL,
    table_name     TEXT NOT NULL,
    op_type        TEXT NOT NULL,
    pk_value       TEXT NOT NULL,
    row_version    INTEGER,
    row_updated_at TEXT,
    payload_json   TEXT NOT NULL,
    created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
);

CREATE TABLE IF NOT EXISTS change_capture (
    id         INTEGER PRIMARY KEY CHECK (id = 1),
    suppressed INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO change_capture (id, suppressed) VALUES (1, 0);
";

/// `json_object(...)` argument list over every column of the table,
/// optionally prefixed with a trigger row qualifier (`NEW.`/`OLD.`)
fn json_object_pairs(kind: TableKind, qualifier: &str) -> String {
    kind.fields()
        .iter()
        .map(|f| format!("'{0}', {1}{0}", f.column, qualifier))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Capture triggers for one business table, with the peer code baked in
fn capture_triggers(db: PeerId, kind: TableKind) -> String {
    let table = kind.table_name();
    let pk = kind.pk_column();
    let code = db.as_str();
    let new_pairs = json_object_pairs(kind, "NEW.");
    let old_pairs = json_object_pairs(kind, "OLD.");

    format!(
        "
CREATE TRIGGER IF NOT EXISTS trg_{table}_capture_insert
AFTER INSERT ON {table}
WHEN (SELECT suppressed FROM change_capture WHERE id = 1) = 0
BEGIN
    INSERT INTO change_log (db_code, table_name, op_type, pk_value, row_version, row_updated_at, payload_json)
    VALUES ('{code}', '{table}', 'INSERT', CAST(NEW.{pk} AS TEXT), NEW.version, NEW.updated_at, json_object({new_pairs}));
END;

CREATE TRIGGER IF NOT EXISTS trg_{table}_capture_update
AFTER UPDATE ON {table}
WHEN (SELECT suppressed FROM change_capture WHERE id = 1) = 0
  AND (NEW.version IS NOT OLD.version OR NEW.updated_at IS NOT OLD.updated_at)
BEGIN
    INSERT INTO change_log (db_code, table_name, op_type, pk_value, row_version, row_updated_at, payload_json)
    VALUES ('{code}', '{table}', 'UPDATE', CAST(NEW.{pk} AS TEXT), NEW.version, NEW.updated_at, json_object({new_pairs}));
END;

CREATE TRIGGER IF NOT EXISTS trg_{table}_capture_delete
AFTER DELETE ON {table}
WHEN (SELECT suppressed FROM change_capture WHERE id = 1) = 0
BEGIN
    INSERT INTO change_log (db_code, table_name, op_type, pk_value, row_version, row_updated_at, payload_json)
    VALUES ('{code}', '{table}', 'DELETE', CAST(OLD.{pk} AS TEXT), OLD.version, OLD.updated_at, json_object({old_pairs}));
END;
"
    )
}

/// SQLite implementation of [`Peer`]
pub struct SqlitePeer {
    id: PeerId,
    conn: Mutex<Connection>,
}

impl SqlitePeer {
    /// Open (and provision) a peer database at the given path
    pub fn open(id: PeerId, path: impl AsRef<Path>) -> Result<Self> {
        Self::init(id, Connection::open(path)?)
    }

    /// Open an in-memory peer database (useful for testing)
    pub fn open_in_memory(id: PeerId) -> Result<Self> {
        Self::init(id, Connection::open_in_memory()?)
    }

    fn init(id: PeerId, conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        for kind in TableKind::ALL {
            conn.execute_batch(&capture_triggers(id, kind))?;
        }
        Ok(Self {
            id,
            conn: Mutex::new(conn),
        })
    }

    /// Recover the guard if a previous holder panicked mid-call
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
        let db_code: String = row.get(1)?;
        let op_type: String = row.get(3)?;
        let row_updated_at: Option<String> = row.get(6)?;
        let created_at: String = row.get(8)?;

        Ok(ChangeLogEntry {
            change_id: row.get(0)?,
            db_code: db_code.parse().map_err(|e| bad_column(1, e))?,
            table_name: row.get(2)?,
            op_type: op_type.parse().map_err(|e| bad_column(3, e))?,
            pk_value: row.get(4)?,
            row_version: row.get(5)?,
            row_updated_at: row_updated_at.as_deref().and_then(codec::parse_timestamp),
            payload_json: row.get(7)?,
            created_at: parse_instant(&created_at)
                .ok_or_else(|| bad_column(8, Error::InvalidRecord(created_at.clone())))?,
        })
    }
}

#[cfg(test)]
impl SqlitePeer {
    /// Test-only escape hatch for seeding rows and raw change-log entries
    pub(crate) fn execute_raw(&self, sql: &str, params: impl rusqlite::Params) -> usize {
        self.conn().execute(sql, params).unwrap()
    }
}

fn to_sql_value(value: Option<&FieldValue>) -> rusqlite::types::Value {
    use rusqlite::types::Value;

    match value {
        None => Value::Null,
        Some(FieldValue::Number(n)) => n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .map_or_else(|| Value::Text(n.to_string()), Value::Real)
            },
            Value::Integer,
        ),
        Some(FieldValue::Text(s)) => Value::Text(s.clone()),
        Some(FieldValue::Boolean(b)) => Value::Integer(i64::from(*b)),
        Some(FieldValue::Timestamp(ts)) => Value::Text(format_naive(*ts)),
    }
}

impl Peer for SqlitePeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn fetch_changes_after(
        &self,
        last_change_id: i64,
        limit: usize,
    ) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT change_id, db_code, table_name, op_type, pk_value,
                    row_version, row_updated_at, payload_json, created_at
             FROM change_log
             WHERE change_id > ?1
             ORDER BY change_id ASC
             LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![last_change_id, limit as i64], Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn get_row_meta(&self, kind: TableKind, pk: i64) -> Result<Option<RowMeta>> {
        let sql = format!(
            "SELECT version, updated_at FROM {} WHERE {} = ?1",
            kind.table_name(),
            kind.pk_column()
        );
        match self.conn().query_row(&sql, params![pk], |row| {
            let version: Option<i64> = row.get(0)?;
            let updated_at: Option<String> = row.get(1)?;
            Ok(RowMeta {
                version,
                updated_at: updated_at.as_deref().and_then(codec::parse_timestamp),
            })
        }) {
            Ok(meta) => Ok(Some(meta)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn get_row_json(&self, kind: TableKind, pk: i64) -> Result<Option<String>> {
        let sql = format!(
            "SELECT json_object({}) FROM {} WHERE {} = ?1",
            json_object_pairs(kind, ""),
            kind.table_name(),
            kind.pk_column()
        );
        match self
            .conn()
            .query_row(&sql, params![pk], |row| row.get::<_, String>(0))
        {
            Ok(json) => Ok(Some(json)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn upsert_row(
        &self,
        kind: TableKind,
        row: &CanonicalRow,
        capture: ChangeCapture,
    ) -> Result<()> {
        if row.primary_key(kind).is_none() {
            return Err(Error::InvalidRecord(format!(
                "row for {kind} is missing its primary key"
            )));
        }

        let fields = kind.fields();
        let columns = fields
            .iter()
            .map(|f| f.column)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=fields.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = fields
            .iter()
            .enumerate()
            .skip(1) // the primary key never changes
            .map(|(i, f)| format!("{} = ?{}", f.column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({placeholders})
             ON CONFLICT({pk}) DO UPDATE SET {assignments}",
            table = kind.table_name(),
            pk = kind.pk_column(),
        );
        let values: Vec<rusqlite::types::Value> = fields
            .iter()
            .map(|f| to_sql_value(row.get(f.name)))
            .collect();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        if capture == ChangeCapture::Suppress {
            tx.execute("UPDATE change_capture SET suppressed = 1 WHERE id = 1", [])?;
        }
        tx.execute(&sql, params_from_iter(values))?;
        if capture == ChangeCapture::Suppress {
            tx.execute("UPDATE change_capture SET suppressed = 0 WHERE id = 1", [])?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use serde_json::Number;

    use super::*;
    use crate::models::ChangeOp;

    fn setup() -> SqlitePeer {
        SqlitePeer::open_in_memory(PeerId::Mysql).unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        codec::parse_timestamp(s).unwrap()
    }

    fn product_row(pk: i64, version: i64, updated_at: &str) -> CanonicalRow {
        let mut row = CanonicalRow::new();
        row.insert("productId", FieldValue::Number(Number::from(pk)));
        row.insert("productName", FieldValue::Text("keyboard".to_string()));
        row.insert("price", FieldValue::Number(Number::from_f64(19.99).unwrap()));
        row.insert("stock", FieldValue::Number(Number::from(120)));
        row.insert("version", FieldValue::Number(Number::from(version)));
        row.insert("updatedAt", FieldValue::Timestamp(ts(updated_at)));
        row.insert("deleted", FieldValue::Boolean(false));
        row
    }

    fn raw_insert_product(peer: &SqlitePeer, pk: i64, version: i64) {
        peer.conn()
            .execute(
                "INSERT INTO product_info (product_id, product_name, price, stock, version, updated_at, deleted)
                 VALUES (?1, 'keyboard', 19.99, 120, ?2, '2024-01-01 10:00:00.000000', 0)",
                params![pk, version],
            )
            .unwrap();
    }

    #[test]
    fn test_insert_is_captured_with_payload() {
        let peer = setup();
        raw_insert_product(&peer, 1, 1);

        let entries = peer.fetch_changes_after(0, 10).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.db_code, PeerId::Mysql);
        assert_eq!(entry.table_name, "product_info");
        assert_eq!(entry.op_type, ChangeOp::Insert);
        assert_eq!(entry.pk_value, "1");
        assert_eq!(entry.row_version, Some(1));
        assert_eq!(entry.row_updated_at, Some(ts("2024-01-01 10:00:00")));

        let row = codec::decode(&entry.payload_json, TableKind::Product);
        assert_eq!(row.primary_key(TableKind::Product), Some(1));
        assert_eq!(row.version(), Some(1));
    }

    #[test]
    fn test_update_is_captured_and_noop_update_is_not() {
        let peer = setup();
        let mut row = product_row(7, 2, "2024-01-01 10:00:00");
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();
        assert_eq!(peer.fetch_changes_after(0, 10).unwrap().len(), 1);

        // replaying the same row leaves version/updated_at unchanged
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();
        assert_eq!(peer.fetch_changes_after(0, 10).unwrap().len(), 1);

        row.set_version(3);
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();
        let entries = peer.fetch_changes_after(0, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op_type, ChangeOp::Update);
        assert_eq!(entries[1].row_version, Some(3));
    }

    #[test]
    fn test_delete_is_captured() {
        let peer = setup();
        raw_insert_product(&peer, 3, 1);
        peer.conn()
            .execute("DELETE FROM product_info WHERE product_id = 3", [])
            .unwrap();

        let entries = peer.fetch_changes_after(0, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op_type, ChangeOp::Delete);
        assert_eq!(entries[1].pk_value, "3");
    }

    #[test]
    fn test_suppressed_upsert_leaves_change_log_untouched() {
        let peer = setup();
        let row = product_row(9, 5, "2024-02-01 08:00:00");
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Suppress)
            .unwrap();

        assert!(peer.fetch_changes_after(0, 10).unwrap().is_empty());
        let meta = peer.get_row_meta(TableKind::Product, 9).unwrap().unwrap();
        assert_eq!(meta.version, Some(5));

        // the flag is cleared inside the same transaction
        let suppressed: i64 = peer
            .conn()
            .query_row("SELECT suppressed FROM change_capture WHERE id = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(suppressed, 0);

        // later writes are captured again
        raw_insert_product(&peer, 10, 1);
        assert_eq!(peer.fetch_changes_after(0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_fetch_changes_honors_cursor_and_limit() {
        let peer = setup();
        for pk in 1..=5 {
            raw_insert_product(&peer, pk, 1);
        }

        let all = peer.fetch_changes_after(0, 10).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].change_id < w[1].change_id));

        let after_two = peer.fetch_changes_after(all[1].change_id, 10).unwrap();
        assert_eq!(after_two.len(), 3);

        let limited = peer.fetch_changes_after(0, 2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_get_row_meta_absent_and_null_version() {
        let peer = setup();
        assert!(peer.get_row_meta(TableKind::Product, 404).unwrap().is_none());

        peer.conn()
            .execute(
                "INSERT INTO product_info (product_id, product_name) VALUES (11, 'bare')",
                [],
            )
            .unwrap();
        let meta = peer.get_row_meta(TableKind::Product, 11).unwrap().unwrap();
        assert_eq!(meta.version, None);
        assert_eq!(meta.updated_at, None);
    }

    #[test]
    fn test_get_row_json_round_trips_through_codec() {
        let peer = setup();
        let row = product_row(42, 3, "2024-01-01 10:00:00");
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();

        let json = peer.get_row_json(TableKind::Product, 42).unwrap().unwrap();
        let decoded = codec::decode(&json, TableKind::Product);
        assert_eq!(decoded.primary_key(TableKind::Product), Some(42));
        assert_eq!(decoded.version(), Some(3));
        assert_eq!(decoded.updated_at(), Some(ts("2024-01-01 10:00:00")));
        assert_eq!(decoded.get("deleted"), Some(&FieldValue::Boolean(false)));

        assert!(peer.get_row_json(TableKind::Product, 404).unwrap().is_none());
    }

    #[test]
    fn test_upsert_updates_existing_row_fields() {
        let peer = setup();
        let mut row = product_row(5, 1, "2024-01-01 10:00:00");
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();

        row.insert("productName", FieldValue::Text("trackball".to_string()));
        row.set_version(2);
        peer.upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap();

        let json = peer.get_row_json(TableKind::Product, 5).unwrap().unwrap();
        let decoded = codec::decode(&json, TableKind::Product);
        assert_eq!(
            decoded.get("productName"),
            Some(&FieldValue::Text("trackball".to_string()))
        );
        assert_eq!(decoded.version(), Some(2));
    }

    #[test]
    fn test_upsert_rejects_row_without_primary_key() {
        let peer = setup();
        let mut row = CanonicalRow::new();
        row.set_version(1);
        let err = peer
            .upsert_row(TableKind::Product, &row, ChangeCapture::Normal)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_order_table_capture() {
        let peer = setup();
        peer.conn()
            .execute(
                "INSERT INTO order_info (order_id, user_id, product_id, quantity, order_status, version, updated_at, deleted)
                 VALUES (100, 1, 42, 2, 'CREATED', 1, '2024-03-01 12:00:00.000000', 0)",
                [],
            )
            .unwrap();

        let entries = peer.fetch_changes_after(0, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table_name, "order_info");

        let row = codec::decode(&entries[0].payload_json, TableKind::Order);
        assert_eq!(row.primary_key(TableKind::Order), Some(100));
        assert_eq!(
            row.get("orderStatus"),
            Some(&FieldValue::Text("CREATED".to_string()))
        );
    }

    #[test]
    fn test_reopen_preserves_rows_and_change_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("mysql.db");

        {
            let peer = SqlitePeer::open(PeerId::Mysql, &path).unwrap();
            peer.upsert_row(
                TableKind::Product,
                &product_row(1, 1, "2024-01-01 10:00:00"),
                ChangeCapture::Normal,
            )
            .unwrap();
        }

        // reopening re-runs provisioning; nothing is lost or re-captured
        let peer = SqlitePeer::open(PeerId::Mysql, &path).unwrap();
        let meta = peer
            .get_row_meta(TableKind::Product, 1)
            .unwrap()
            .unwrap();
        assert_eq!(meta.version, Some(1));
        assert_eq!(peer.fetch_changes_after(0, 10).unwrap().len(), 1);
    }
}
