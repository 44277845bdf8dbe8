//! Canonical in-memory row representation

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::Number;

use super::TableKind;

/// A typed value inside a canonical row
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Integer or decimal, kept as received on the wire
    Number(Number),
    /// Free text
    Text(String),
    /// Normalized boolean
    Boolean(bool),
    /// Naive local datetime
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    /// Integer view; numeric strings are tolerated (peers disagree on
    /// whether versions arrive as numbers or text)
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Timestamp view
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Version/timestamp metadata of an existing peer row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowMeta {
    /// Optimistic version counter, if the column is populated
    pub version: Option<i64>,
    /// Last business update instant, if the column is populated
    pub updated_at: Option<NaiveDateTime>,
}

/// A decoded row keyed by canonical field name, produced by the codec from
/// a change-log payload or a peer snapshot. Transient; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRow {
    fields: BTreeMap<&'static str, FieldValue>,
}

impl CanonicalRow {
    /// Create an empty row
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field decoded successfully
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of populated fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Set a field value
    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.fields.insert(name, value);
    }

    /// Look up a field value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Numeric primary key for the given table kind
    #[must_use]
    pub fn primary_key(&self, kind: TableKind) -> Option<i64> {
        self.get(kind.pk_field()).and_then(FieldValue::as_i64)
    }

    /// Optimistic version counter
    #[must_use]
    pub fn version(&self) -> Option<i64> {
        self.get("version").and_then(FieldValue::as_i64)
    }

    /// Last business update instant
    #[must_use]
    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        self.get("updatedAt").and_then(FieldValue::as_timestamp)
    }

    /// Overwrite the version counter
    pub fn set_version(&mut self, version: i64) {
        self.insert("version", FieldValue::Number(Number::from(version)));
    }
}
