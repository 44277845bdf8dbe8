//! Change-log entries captured by peer triggers

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use super::PeerId;
use crate::error::Error;

/// Row mutation kind recorded by a capture trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted (recorded but never propagated)
    Delete,
}

impl ChangeOp {
    /// Wire code stored in the `op_type` column
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::InvalidRecord(format!("unknown op_type: {s}"))),
        }
    }
}

/// One row mutation appended by a peer's change-capture trigger.
///
/// Entries are consumed in ascending `change_id` order and never mutated
/// or deleted by the sync core.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    /// Monotonic per-peer cursor value
    pub change_id: i64,
    /// Peer that captured the mutation
    pub db_code: PeerId,
    /// Mutated table
    pub table_name: String,
    /// Mutation kind
    pub op_type: ChangeOp,
    /// String-encoded primary key
    pub pk_value: String,
    /// Row version at capture time, when available
    pub row_version: Option<i64>,
    /// Row update instant at capture time, when available
    pub row_updated_at: Option<NaiveDateTime>,
    /// Full row snapshot at mutation time
    pub payload_json: String,
    /// Capture instant
    pub created_at: DateTime<Utc>,
}
