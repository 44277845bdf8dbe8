//! Conflict record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PeerId;
use crate::error::Error;

/// Lifecycle state of a recorded divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    /// Awaiting an administrator's decision
    #[serde(rename = "OPEN")]
    Open,
    /// Closed by the resolution service
    #[serde(rename = "RESOLVED")]
    Resolved,
}

impl ConflictStatus {
    /// Wire code stored in the `status` column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "RESOLVED" => Ok(Self::Resolved),
            _ => Err(Error::InvalidRecord(format!("unknown conflict status: {s}"))),
        }
    }
}

/// Detection-time fields of a conflict about to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    /// Replicated table the divergence was found on
    pub table_name: String,
    /// String-encoded primary key
    pub pk_value: String,
    /// Peer whose change was being propagated
    pub source_db: PeerId,
    /// Peer that refused the overwrite
    pub target_db: PeerId,
    /// Version carried by the incoming change
    pub source_version: Option<i64>,
    /// Version currently held by the target
    pub target_version: Option<i64>,
    /// Update instant carried by the incoming change
    pub source_updated_at: Option<NaiveDateTime>,
    /// Update instant currently held by the target
    pub target_updated_at: Option<NaiveDateTime>,
    /// Wire payload of the incoming change
    pub source_payload_json: String,
    /// Fresh snapshot of the target row at detection time
    pub target_payload_json: Option<String>,
}

/// One recorded divergence between two peers on a single row.
///
/// Created OPEN by the engine; transitions to RESOLVED only through the
/// resolution service; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    /// Store-assigned identifier
    pub conflict_id: i64,
    /// Replicated table the divergence was found on
    pub table_name: String,
    /// String-encoded primary key
    pub pk_value: String,
    /// Peer whose change was being propagated
    pub source_db: PeerId,
    /// Peer that refused the overwrite
    pub target_db: PeerId,
    /// Version carried by the incoming change
    pub source_version: Option<i64>,
    /// Version held by the target at detection time
    pub target_version: Option<i64>,
    /// Update instant carried by the incoming change
    pub source_updated_at: Option<NaiveDateTime>,
    /// Update instant held by the target at detection time
    pub target_updated_at: Option<NaiveDateTime>,
    /// Wire payload of the incoming change
    pub source_payload_json: String,
    /// Snapshot of the target row at detection time
    pub target_payload_json: Option<String>,
    /// Lifecycle state
    pub status: ConflictStatus,
    /// Administrator who resolved the conflict
    pub resolved_by: Option<String>,
    /// Resolution instant
    pub resolved_at: Option<DateTime<Utc>>,
    /// Peer chosen as authoritative
    pub resolution: Option<PeerId>,
    /// Detection instant
    pub created_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// True once the resolution service has closed this record
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [ConflictStatus::Open, ConflictStatus::Resolved] {
            assert_eq!(status.as_str().parse::<ConflictStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("PENDING".parse::<ConflictStatus>().is_err());
    }
}
