//! Replicated table kinds and their field mappings

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value class a field carries through the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer or decimal, kept as a JSON number
    Number,
    /// Free text
    Text,
    /// Normalized boolean flag
    Boolean,
    /// Naive local datetime
    Timestamp,
}

/// One logical field of a replicated table
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Canonical camelCase field name
    pub name: &'static str,
    /// Peer-native snake_case column name
    pub column: &'static str,
    /// Value class used for codec normalization
    pub kind: FieldKind,
}

const fn field(name: &'static str, column: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, column, kind }
}

const PRODUCT_FIELDS: &[FieldSpec] = &[
    field("productId", "product_id", FieldKind::Number),
    field("productName", "product_name", FieldKind::Text),
    field("categoryId", "category_id", FieldKind::Number),
    field("supplierId", "supplier_id", FieldKind::Number),
    field("price", "price", FieldKind::Number),
    field("stock", "stock", FieldKind::Number),
    field("description", "description", FieldKind::Text),
    field("listedAt", "listed_at", FieldKind::Timestamp),
    field("version", "version", FieldKind::Number),
    field("updatedAt", "updated_at", FieldKind::Timestamp),
    field("deleted", "deleted", FieldKind::Boolean),
];

const ORDER_FIELDS: &[FieldSpec] = &[
    field("orderId", "order_id", FieldKind::Number),
    field("userId", "user_id", FieldKind::Number),
    field("productId", "product_id", FieldKind::Number),
    field("quantity", "quantity", FieldKind::Number),
    field("orderStatus", "order_status", FieldKind::Text),
    field("orderedAt", "ordered_at", FieldKind::Timestamp),
    field("shippingAddress", "shipping_address", FieldKind::Text),
    field("version", "version", FieldKind::Number),
    field("updatedAt", "updated_at", FieldKind::Timestamp),
    field("deleted", "deleted", FieldKind::Boolean),
];

/// One of the replicated table shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    /// `product_info`
    #[serde(rename = "product_info")]
    Product,
    /// `order_info`
    #[serde(rename = "order_info")]
    Order,
}

impl TableKind {
    /// Both replicated tables
    pub const ALL: [Self; 2] = [Self::Product, Self::Order];

    /// Physical table name on every peer
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Product => "product_info",
            Self::Order => "order_info",
        }
    }

    /// Resolve a change-log/conflict table name; `None` for tables outside
    /// the replicated set
    #[must_use]
    pub fn from_table_name(name: &str) -> Option<Self> {
        match name {
            "product_info" => Some(Self::Product),
            "order_info" => Some(Self::Order),
            _ => None,
        }
    }

    /// Field mapping for this table, primary key first
    #[must_use]
    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Product => PRODUCT_FIELDS,
            Self::Order => ORDER_FIELDS,
        }
    }

    /// Canonical name of the primary-key field
    #[must_use]
    pub const fn pk_field(self) -> &'static str {
        match self {
            Self::Product => "productId",
            Self::Order => "orderId",
        }
    }

    /// Snake_case column of the primary key
    #[must_use]
    pub const fn pk_column(self) -> &'static str {
        match self {
            Self::Product => "product_id",
            Self::Order => "order_id",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}
