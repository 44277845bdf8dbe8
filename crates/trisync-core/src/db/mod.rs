//! Storage layer: peer databases and the replication state store

mod peer;
mod sqlite_peer;
mod store;

pub use peer::{ChangeCapture, Peer, PeerSet};
pub use sqlite_peer::SqlitePeer;
pub use store::{SqliteSyncStore, SyncStateStore};

use chrono::{DateTime, NaiveDateTime, Utc};

pub(crate) const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a naive timestamp the way the peer schemas store them
pub(crate) fn format_naive(ts: NaiveDateTime) -> String {
    ts.format(SQL_DATETIME_FORMAT).to_string()
}

/// Render an instant as naive UTC text
pub(crate) fn format_instant(ts: DateTime<Utc>) -> String {
    format_naive(ts.naive_utc())
}

/// Parse stored naive-UTC text back into an instant
pub(crate) fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    crate::codec::parse_timestamp(s).map(|naive| naive.and_utc())
}

pub(crate) fn bad_column<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
