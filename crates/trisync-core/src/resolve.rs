//! Conflict resolution
//!
//! An administrator picks the authoritative peer for an open conflict. The
//! resolver fetches that peer's current row, stamps it with a version that
//! strictly dominates every peer's current version, writes it to the two
//! other peers with change capture suppressed, and only then closes the
//! conflict. Any failure before the close leaves the conflict OPEN for a
//! retry; partial propagation is tolerated because the writes are upserts
//! keyed by primary key.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::codec;
use crate::db::{ChangeCapture, Peer, PeerSet, SyncStateStore};
use crate::error::{Error, Result};
use crate::models::{PeerId, TableKind};

/// Outcome of a successful resolution
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub conflict_id: i64,
    pub table_name: String,
    pub pk_value: String,
    pub authoritative_db: PeerId,
    pub final_version: i64,
    /// Peers the reconciled row was written to
    pub propagated_to: [PeerId; 2],
}

/// Applies an administrator's conflict decision across the peers
pub struct ConflictResolver {
    peers: PeerSet,
    store: Arc<dyn SyncStateStore>,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(peers: PeerSet, store: Arc<dyn SyncStateStore>) -> Self {
        Self { peers, store }
    }

    pub fn resolve(
        &self,
        conflict_id: i64,
        authoritative: PeerId,
        admin: &str,
    ) -> Result<Resolution> {
        let conflict = self
            .store
            .get_conflict(conflict_id)?
            .ok_or(Error::ConflictNotFound(conflict_id))?;
        if conflict.is_resolved() {
            return Err(Error::ConflictAlreadyResolved(conflict_id));
        }

        let kind = TableKind::from_table_name(&conflict.table_name)
            .ok_or_else(|| Error::UnsupportedTable(conflict.table_name.clone()))?;
        let pk: i64 = conflict.pk_value.trim().parse().map_err(|_| {
            Error::InvalidRecord(format!(
                "primary key {:?} is not numeric",
                conflict.pk_value
            ))
        })?;

        let snapshot = self
            .peers
            .get(authoritative)
            .get_row_json(kind, pk)?
            .ok_or_else(|| Error::MissingAuthoritativeRow {
                peer: authoritative,
                table: conflict.table_name.clone(),
                pk: conflict.pk_value.clone(),
            })?;
        let mut row = codec::decode(&snapshot, kind);
        if row.is_empty() {
            return Err(Error::InvalidRecord(format!(
                "snapshot for {} pk {} on {authoritative} decoded empty",
                conflict.table_name, conflict.pk_value
            )));
        }

        let final_version = self.max_version_across_peers(kind, pk)? + 1;
        row.set_version(final_version);

        let targets = authoritative.others();
        for target in targets {
            self.peers
                .get(target)
                .upsert_row(kind, &row, ChangeCapture::Suppress)?;
        }

        self.store.mark_resolved(conflict_id, admin, authoritative)?;
        info!(
            "Conflict #{conflict_id} resolved by {admin}: {} pk {} now at version \
             {final_version} from {authoritative}",
            conflict.table_name, conflict.pk_value
        );

        Ok(Resolution {
            conflict_id,
            table_name: conflict.table_name,
            pk_value: conflict.pk_value,
            authoritative_db: authoritative,
            final_version,
            propagated_to: targets,
        })
    }

    /// Highest version any peer currently holds for the row; an absent row
    /// counts as version 0
    fn max_version_across_peers(&self, kind: TableKind, pk: i64) -> Result<i64> {
        let mut max = 0;
        for peer in PeerId::ALL {
            let version = self
                .peers
                .get(peer)
                .get_row_meta(kind, pk)?
                .and_then(|meta| meta.version)
                .unwrap_or(0);
            max = max.max(version);
        }
        Ok(max)
    }
}
