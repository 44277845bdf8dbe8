//! Peer abstraction over the three synchronized databases

use std::sync::Arc;

use crate::error::Result;
use crate::models::{CanonicalRow, ChangeLogEntry, PeerId, RowMeta, TableKind};

/// Change-capture behavior of a peer write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCapture {
    /// The peer's capture trigger records the write as usual
    Normal,
    /// The capture trigger is disabled for the write, inside the same
    /// transaction, so the write cannot re-enter the change log
    Suppress,
}

/// Operations the sync core needs from one peer database.
///
/// The engine and the resolution service are written once against this
/// trait; each concrete database implements it.
pub trait Peer: Send + Sync {
    /// Identity of this peer
    fn id(&self) -> PeerId;

    /// Change-log entries with `change_id` greater than the cursor,
    /// ascending, at most `limit`
    fn fetch_changes_after(&self, last_change_id: i64, limit: usize)
        -> Result<Vec<ChangeLogEntry>>;

    /// Version/updated-at metadata for a row; `None` when the row is absent
    fn get_row_meta(&self, kind: TableKind, pk: i64) -> Result<Option<RowMeta>>;

    /// Full-row JSON snapshot; `None` when the row is absent
    fn get_row_json(&self, kind: TableKind, pk: i64) -> Result<Option<String>>;

    /// Insert-or-update keyed by primary key
    fn upsert_row(&self, kind: TableKind, row: &CanonicalRow, capture: ChangeCapture)
        -> Result<()>;
}

/// The three peers, addressable by identity
#[derive(Clone)]
pub struct PeerSet {
    mysql: Arc<dyn Peer>,
    postgres: Arc<dyn Peer>,
    sqlserver: Arc<dyn Peer>,
}

impl PeerSet {
    /// Assemble the peer set
    #[must_use]
    pub fn new(mysql: Arc<dyn Peer>, postgres: Arc<dyn Peer>, sqlserver: Arc<dyn Peer>) -> Self {
        debug_assert_eq!(mysql.id(), PeerId::Mysql);
        debug_assert_eq!(postgres.id(), PeerId::Postgres);
        debug_assert_eq!(sqlserver.id(), PeerId::SqlServer);
        Self {
            mysql,
            postgres,
            sqlserver,
        }
    }

    /// Look up one peer
    #[must_use]
    pub fn get(&self, id: PeerId) -> &dyn Peer {
        match id {
            PeerId::Mysql => self.mysql.as_ref(),
            PeerId::Postgres => self.postgres.as_ref(),
            PeerId::SqlServer => self.sqlserver.as_ref(),
        }
    }
}
