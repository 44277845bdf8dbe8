//! trisync-core - Core library for trisync
//!
//! This crate keeps three independently-writable databases ("peers")
//! eventually consistent for a small set of shared tables: change-log
//! driven propagation with optimistic version conflict detection, a
//! human-mediated conflict-resolution workflow, and a scheduling
//! coordinator that guarantees at most one sync pass runs at a time.

pub mod codec;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod link;
pub mod models;
pub mod notify;
pub mod resolve;
pub mod scheduler;

pub use error::{Error, Result};
pub use models::{CanonicalRow, ConflictRecord, ConflictStatus, PeerId, TableKind};
