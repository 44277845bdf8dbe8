//! Error types for trisync-core

use thiserror::Error;

use crate::models::PeerId;

/// Result type alias using trisync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trisync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Conflict record not found
    #[error("Conflict not found: {0}")]
    ConflictNotFound(i64),

    /// Conflict was already resolved
    #[error("Conflict {0} is already resolved")]
    ConflictAlreadyResolved(i64),

    /// Not one of the three known peer identifiers
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Table name outside the replicated set
    #[error("Unsupported table: {0}")]
    UnsupportedTable(String),

    /// Stored record that cannot be interpreted (bad pk, undecodable snapshot)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Authoritative peer no longer holds the row under resolution
    #[error("No row for {table} pk {pk} on authoritative peer {peer}")]
    MissingAuthoritativeRow {
        /// Peer chosen as authoritative
        peer: PeerId,
        /// Replicated table name
        table: String,
        /// Primary key value as recorded in the conflict
        pk: String,
    },

    /// Resolution link signing/verification error
    #[error("Link token error: {0}")]
    Token(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notify(String),
}
