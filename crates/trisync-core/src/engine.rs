//! Change propagation engine
//!
//! Consumes each source peer's change log after its checkpoint, decodes the
//! payloads and propagates every row to the two other peers with conflict
//! detection. Conflicts are recorded once per open (table, pk) pair and
//! announced to the administrator. The checkpoint only advances after a
//! fully applied batch, so a mid-batch failure replays the whole batch on
//! the next pass; every step here tolerates that replay.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::MailSettings;
use crate::db::{ChangeCapture, Peer, PeerSet, SyncStateStore};
use crate::error::Result;
use crate::link::ResolutionLinkSigner;
use crate::models::{
    CanonicalRow, ChangeLogEntry, ChangeOp, NewConflict, PeerId, RowMeta, TableKind,
};
use crate::notify::{conflict_notification, Notifier};

/// Outcome of one pass over a single source peer's change log
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: PeerId,
    /// Change-log entries read this pass
    pub fetched: usize,
    /// Rows written to target peers
    pub applied: usize,
    /// Propagations classified as conflicts
    pub conflicts: usize,
    /// Entries dropped (unsupported table, DELETE, undecodable payload)
    pub skipped: usize,
    /// Committed checkpoint after the pass
    pub cursor: i64,
    pub error: Option<String>,
}

/// Outcome of one full [`SyncEngine::sync_once`] call
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    #[must_use]
    pub fn total_applied(&self) -> usize {
        self.sources.iter().map(|s| s.applied).sum()
    }

    #[must_use]
    pub fn total_conflicts(&self) -> usize {
        self.sources.iter().map(|s| s.conflicts).sum()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.sources.iter().any(|s| s.error.is_some())
    }
}

enum Propagation {
    Applied,
    Conflict,
}

/// Drives change propagation between the three peers
pub struct SyncEngine {
    peers: PeerSet,
    store: Arc<dyn SyncStateStore>,
    notifier: Arc<dyn Notifier>,
    signer: ResolutionLinkSigner,
    mail: Option<MailSettings>,
    batch_size: usize,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        peers: PeerSet,
        store: Arc<dyn SyncStateStore>,
        notifier: Arc<dyn Notifier>,
        signer: ResolutionLinkSigner,
        mail: Option<MailSettings>,
        batch_size: usize,
    ) -> Self {
        Self {
            peers,
            store,
            notifier,
            signer,
            mail,
            batch_size,
        }
    }

    /// Process one bounded batch from every source peer's change log
    pub fn sync_once(&self) -> SyncReport {
        let mut sources = Vec::with_capacity(PeerId::SOURCES.len());
        for source in PeerId::SOURCES {
            sources.push(self.sync_source(source));
        }
        SyncReport { sources }
    }

    fn sync_source(&self, source: PeerId) -> SourceReport {
        let mut report = SourceReport {
            source,
            fetched: 0,
            applied: 0,
            conflicts: 0,
            skipped: 0,
            cursor: 0,
            error: None,
        };
        if let Err(err) = self.sync_source_inner(source, &mut report) {
            warn!("Sync pass failed for source {source}: {err}");
            report.error = Some(err.to_string());
        }
        report
    }

    fn sync_source_inner(&self, source: PeerId, report: &mut SourceReport) -> Result<()> {
        let last = self
            .store
            .checkpoint(source)?
            .map_or(0, |cp| cp.last_change_id);
        report.cursor = last;

        let entries = self
            .peers
            .get(source)
            .fetch_changes_after(last, self.batch_size)?;
        if entries.is_empty() {
            return Ok(());
        }
        report.fetched = entries.len();

        let mut cursor = last;
        for entry in &entries {
            self.apply_entry(source, entry, report)?;
            cursor = entry.change_id;
        }

        self.store.save_checkpoint(source, cursor)?;
        report.cursor = cursor;
        info!(
            "Synced {} change(s) from {source}: {} applied, {} conflict(s), {} skipped",
            report.fetched, report.applied, report.conflicts, report.skipped
        );
        Ok(())
    }

    fn apply_entry(
        &self,
        source: PeerId,
        entry: &ChangeLogEntry,
        report: &mut SourceReport,
    ) -> Result<()> {
        let Some(kind) = TableKind::from_table_name(&entry.table_name) else {
            debug!(
                "Skipping change {}: unsupported table {}",
                entry.change_id, entry.table_name
            );
            report.skipped += 1;
            return Ok(());
        };
        if entry.op_type == ChangeOp::Delete {
            debug!(
                "Skipping change {}: DELETE for {} pk {}",
                entry.change_id, entry.table_name, entry.pk_value
            );
            report.skipped += 1;
            return Ok(());
        }

        let row = codec::decode(&entry.payload_json, kind);
        if row.is_empty() {
            warn!(
                "Skipping change {}: payload for {} pk {} did not decode",
                entry.change_id, entry.table_name, entry.pk_value
            );
            report.skipped += 1;
            return Ok(());
        }
        let Some(pk) = row.primary_key(kind) else {
            warn!(
                "Skipping change {}: payload for {} carries no usable primary key",
                entry.change_id, entry.table_name
            );
            report.skipped += 1;
            return Ok(());
        };

        for target in source.others() {
            match self.propagate(kind, pk, &row, entry, source, target)? {
                Propagation::Applied => report.applied += 1,
                Propagation::Conflict => report.conflicts += 1,
            }
        }
        Ok(())
    }

    fn propagate(
        &self,
        kind: TableKind,
        pk: i64,
        row: &CanonicalRow,
        entry: &ChangeLogEntry,
        source: PeerId,
        target: PeerId,
    ) -> Result<Propagation> {
        let target_peer = self.peers.get(target);
        let Some(target_meta) = target_peer.get_row_meta(kind, pk)? else {
            target_peer.upsert_row(kind, row, ChangeCapture::Normal)?;
            return Ok(Propagation::Applied);
        };

        let source_meta = RowMeta {
            version: row.version(),
            updated_at: row.updated_at(),
        };
        if is_conflict(source_meta, target_meta) {
            let conflict = NewConflict {
                table_name: kind.table_name().to_string(),
                pk_value: pk.to_string(),
                source_db: source,
                target_db: target,
                source_version: source_meta.version,
                target_version: target_meta.version,
                source_updated_at: source_meta.updated_at,
                target_updated_at: target_meta.updated_at,
                source_payload_json: entry.payload_json.clone(),
                target_payload_json: target_peer.get_row_json(kind, pk)?,
            };
            self.record_conflict(conflict)?;
            return Ok(Propagation::Conflict);
        }

        target_peer.upsert_row(kind, row, ChangeCapture::Normal)?;
        Ok(Propagation::Applied)
    }

    fn record_conflict(&self, conflict: NewConflict) -> Result<()> {
        if let Some(existing) = self
            .store
            .find_open_conflict(&conflict.table_name, &conflict.pk_value)?
        {
            debug!(
                "Conflict for {} pk {} already open as #{existing}, skipping",
                conflict.table_name, conflict.pk_value
            );
            return Ok(());
        }

        warn!(
            "Conflict detected: table={}, pk={}, source={}, target={}",
            conflict.table_name, conflict.pk_value, conflict.source_db, conflict.target_db
        );
        let conflict_id = self.store.insert_conflict(&conflict)?;
        self.announce(conflict_id, &conflict);
        Ok(())
    }

    /// Best-effort: link signing or delivery failures must not fail the pass
    fn announce(&self, conflict_id: i64, conflict: &NewConflict) {
        let Some(mail) = &self.mail else {
            debug!("Mail settings absent, conflict #{conflict_id} recorded without notification");
            return;
        };
        let token = match self.signer.generate(conflict_id, &mail.admin_user) {
            Ok(token) => token,
            Err(err) => {
                warn!("Could not sign resolution link for conflict #{conflict_id}: {err}");
                return;
            }
        };
        let link = format!(
            "{}/conflicts/view?token={token}",
            mail.view_base_url.trim_end_matches('/')
        );
        let (subject, body) = conflict_notification(conflict_id, conflict, &link);
        if let Err(err) = self.notifier.notify(&mail.admin_to, &subject, &body) {
            warn!("Could not deliver conflict notification for #{conflict_id}: {err}");
        }
    }
}

/// A target row must not be overwritten when it is strictly newer than the
/// incoming source row, or when either side's metadata is missing.
fn is_conflict(source: RowMeta, target: RowMeta) -> bool {
    let (Some(source_version), Some(source_updated_at)) = (source.version, source.updated_at)
    else {
        return true;
    };
    let (Some(target_version), Some(target_updated_at)) = (target.version, target.updated_at)
    else {
        return true;
    };
    target_version > source_version
        || (target_version == source_version && target_updated_at > source_updated_at)
}
