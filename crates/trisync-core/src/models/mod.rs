//! Data models for trisync

mod change;
mod checkpoint;
mod conflict;
mod peer_id;
mod row;
mod table;

pub use change::{ChangeLogEntry, ChangeOp};
pub use checkpoint::SyncCheckpoint;
pub use conflict::{ConflictRecord, ConflictStatus, NewConflict};
pub use peer_id::PeerId;
pub use row::{CanonicalRow, FieldValue, RowMeta};
pub use table::{FieldKind, FieldSpec, TableKind};
