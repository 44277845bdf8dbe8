//! Sync checkpoint model

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PeerId;

/// Cursor over one source peer's change log.
///
/// `last_change_id` is monotonically non-decreasing: read at the start of a
/// sync pass, written once at the end of a successful pass for that source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncCheckpoint {
    /// Source peer this cursor belongs to
    pub source_db: PeerId,
    /// Highest change id already processed
    pub last_change_id: i64,
    /// Last advance instant
    pub updated_at: DateTime<Utc>,
}
