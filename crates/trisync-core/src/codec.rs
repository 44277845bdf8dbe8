//! Row codec: peer JSON payloads and snapshots to canonical rows
//!
//! Decoding fails soft: malformed input yields an empty row instead of an
//! error, so the engine can skip poison-pill change-log entries without
//! aborting a pass.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use crate::models::{CanonicalRow, FieldKind, FieldSpec, FieldValue, TableKind};

// ISO date portion length "yyyy-MM-dd" (10 chars) - used in has_timezone_offset()
// to distinguish date hyphens from timezone offset hyphens
const ISO_DATE_PORTION_LEN: usize = 10;

/// Decode a JSON payload or snapshot into a canonical row.
///
/// For each field of the table kind, the peer-native snake_case key is
/// tried first, then the canonical camelCase key; the first present
/// non-null value wins. Unparseable timestamps and unrecognized boolean
/// spellings leave their field unset.
#[must_use]
pub fn decode(json: &str, kind: TableKind) -> CanonicalRow {
    let mut row = CanonicalRow::new();
    if json.trim().is_empty() {
        return row;
    }

    let map = match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            tracing::debug!("payload is not a JSON object: {other}");
            return row;
        }
        Err(err) => {
            tracing::debug!("failed to parse payload JSON: {err}");
            return row;
        }
    };

    for spec in kind.fields() {
        match spec.kind {
            FieldKind::Timestamp => put_timestamp(&mut row, spec, &map),
            FieldKind::Boolean => put_boolean(&mut row, spec, &map),
            FieldKind::Number | FieldKind::Text => put_value(&mut row, spec, &map),
        }
    }
    row
}

fn candidate_keys(spec: &FieldSpec) -> impl Iterator<Item = &'static str> {
    let distinct = if spec.column == spec.name { 1 } else { 2 };
    [spec.column, spec.name].into_iter().take(distinct)
}

fn put_value(row: &mut CanonicalRow, spec: &FieldSpec, map: &Map<String, Value>) {
    for key in candidate_keys(spec) {
        match map.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                row.insert(spec.name, FieldValue::Number(n.clone()));
                return;
            }
            Some(Value::Bool(b)) => {
                row.insert(spec.name, FieldValue::Boolean(*b));
                return;
            }
            Some(Value::String(s)) => {
                row.insert(spec.name, FieldValue::Text(s.clone()));
                return;
            }
            Some(other) => {
                row.insert(spec.name, FieldValue::Text(other.to_string()));
                return;
            }
        }
    }
}

fn put_boolean(row: &mut CanonicalRow, spec: &FieldSpec, map: &Map<String, Value>) {
    for key in candidate_keys(spec) {
        let Some(v) = map.get(key) else { continue };
        if v.is_null() {
            continue;
        }
        // first present candidate decides; an unrecognized spelling leaves
        // the field unset for the store to treat as NULL
        if let Some(b) = normalize_boolean(v) {
            row.insert(spec.name, FieldValue::Boolean(b));
        }
        return;
    }
}

fn put_timestamp(row: &mut CanonicalRow, spec: &FieldSpec, map: &Map<String, Value>) {
    for key in candidate_keys(spec) {
        let Some(v) = map.get(key) else { continue };
        if v.is_null() {
            continue;
        }
        let text = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if let Some(ts) = parse_timestamp(&text) {
            row.insert(spec.name, FieldValue::Timestamp(ts));
            return;
        }
        tracing::debug!("timestamp field '{key}' value '{text}' did not parse, trying next candidate");
    }
}

fn normalize_boolean(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn has_timezone_offset(s: &str) -> bool {
    if !s.contains('T') {
        return false;
    }
    if s.contains('+') {
        return true;
    }
    s.rfind('-').is_some_and(|i| i > ISO_DATE_PORTION_LEN)
}

/// Parse one timestamp wire value to a naive local datetime.
///
/// Tried in order: UTC (`Z` suffix), offset datetime, `T`-separated naive
/// ISO, space-separated `yyyy-MM-dd HH:mm:ss` with optional fractional
/// seconds, then a plain naive ISO parse. `None` when nothing matches.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if s.ends_with('Z') || has_timezone_offset(s) {
        return DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local());
    }
    if s.contains('T') {
        return NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok();
    }
    if s.contains(' ') {
        return NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok();
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::Number;

    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_decode_snake_case_product_payload() {
        let json = r#"{
            "product_id": 42,
            "product_name": "keyboard",
            "category_id": 3,
            "supplier_id": 9,
            "price": 19.99,
            "stock": 120,
            "description": "mechanical",
            "listed_at": "2023-11-05 09:30:00",
            "version": 3,
            "updated_at": "2024-01-01 10:00:00.000000",
            "deleted": 0
        }"#;
        let row = decode(json, TableKind::Product);

        assert_eq!(row.primary_key(TableKind::Product), Some(42));
        assert_eq!(
            row.get("productName"),
            Some(&FieldValue::Text("keyboard".to_string()))
        );
        assert_eq!(row.version(), Some(3));
        assert_eq!(row.updated_at(), Some(ts("2024-01-01 10:00:00")));
        assert_eq!(row.get("deleted"), Some(&FieldValue::Boolean(false)));
        assert_eq!(
            row.get("price"),
            Some(&FieldValue::Number(Number::from_f64(19.99).unwrap()))
        );
    }

    #[test]
    fn test_decode_camel_case_fallback() {
        let json = r#"{"orderId": 7, "userId": 1, "orderStatus": "SHIPPED", "version": 2}"#;
        let row = decode(json, TableKind::Order);

        assert_eq!(row.primary_key(TableKind::Order), Some(7));
        assert_eq!(
            row.get("orderStatus"),
            Some(&FieldValue::Text("SHIPPED".to_string()))
        );
    }

    #[test]
    fn test_snake_case_key_wins_over_camel_case() {
        let json = r#"{"product_id": 1, "product_name": "from_snake", "productName": "from_camel"}"#;
        let row = decode(json, TableKind::Product);
        assert_eq!(
            row.get("productName"),
            Some(&FieldValue::Text("from_snake".to_string()))
        );
    }

    #[test]
    fn test_null_snake_key_falls_back_to_camel() {
        let json = r#"{"product_id": 1, "product_name": null, "productName": "fallback"}"#;
        let row = decode(json, TableKind::Product);
        assert_eq!(
            row.get("productName"),
            Some(&FieldValue::Text("fallback".to_string()))
        );
    }

    #[test]
    fn test_malformed_json_yields_empty_row() {
        assert!(decode("{not json", TableKind::Product).is_empty());
        assert!(decode("", TableKind::Product).is_empty());
        assert!(decode("   ", TableKind::Product).is_empty());
        assert!(decode("[1,2,3]", TableKind::Product).is_empty());
        assert!(decode("42", TableKind::Product).is_empty());
    }

    #[test]
    fn test_version_as_numeric_string() {
        let json = r#"{"product_id": "42", "version": "5"}"#;
        let row = decode(json, TableKind::Product);
        assert_eq!(row.get("version"), Some(&FieldValue::Text("5".to_string())));
        assert_eq!(row.version(), Some(5));
        assert_eq!(row.primary_key(TableKind::Product), Some(42));
    }

    #[test]
    fn test_timestamp_utc_suffix() {
        assert_eq!(
            parse_timestamp("2024-01-01T10:00:00Z"),
            Some(ts("2024-01-01 10:00:00"))
        );
    }

    #[test]
    fn test_timestamp_positive_offset_keeps_wall_clock() {
        assert_eq!(
            parse_timestamp("2024-01-01T10:00:00+08:00"),
            Some(ts("2024-01-01 10:00:00"))
        );
    }

    #[test]
    fn test_timestamp_negative_offset_is_not_a_date_hyphen() {
        assert_eq!(
            parse_timestamp("2024-01-01T10:00:00-05:00"),
            Some(ts("2024-01-01 10:00:00"))
        );
    }

    #[test]
    fn test_timestamp_naive_iso() {
        assert_eq!(
            parse_timestamp("2024-01-01T10:00:00"),
            Some(ts("2024-01-01 10:00:00"))
        );
    }

    #[test]
    fn test_timestamp_space_separated_with_fraction() {
        let parsed = parse_timestamp("2024-01-01 10:00:00.123456").unwrap();
        assert_eq!(parsed.and_utc().timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_timestamp_space_separated_without_fraction() {
        assert!(parse_timestamp("2024-01-01 10:00:00").is_some());
    }

    #[test]
    fn test_timestamp_unparseable_is_none() {
        assert_eq!(parse_timestamp("2024-01-01"), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_unparseable_timestamp_field_is_omitted() {
        let json = r#"{"product_id": 1, "updated_at": "not-a-time"}"#;
        let row = decode(json, TableKind::Product);
        assert_eq!(row.updated_at(), None);
        assert!(!row.is_empty());
    }

    #[test]
    fn test_timestamp_falls_back_to_next_candidate_key() {
        let json = r#"{"product_id": 1, "updated_at": "garbage", "updatedAt": "2024-01-01T10:00:00"}"#;
        let row = decode(json, TableKind::Product);
        assert_eq!(row.updated_at(), Some(ts("2024-01-01 10:00:00")));
    }

    #[test]
    fn test_boolean_spellings() {
        for (raw, expected) in [
            (r#"{"product_id":1,"deleted":true}"#, Some(true)),
            (r#"{"product_id":1,"deleted":1}"#, Some(true)),
            (r#"{"product_id":1,"deleted":"T"}"#, Some(true)),
            (r#"{"product_id":1,"deleted":"on"}"#, Some(true)),
            (r#"{"product_id":1,"deleted":"YES"}"#, Some(true)),
            (r#"{"product_id":1,"deleted":false}"#, Some(false)),
            (r#"{"product_id":1,"deleted":0}"#, Some(false)),
            (r#"{"product_id":1,"deleted":"off"}"#, Some(false)),
            (r#"{"product_id":1,"deleted":"n"}"#, Some(false)),
            (r#"{"product_id":1,"deleted":"maybe"}"#, None),
            (r#"{"product_id":1,"deleted":null}"#, None),
        ] {
            let row = decode(raw, TableKind::Product);
            let got = row.get("deleted").map(|v| *v == FieldValue::Boolean(true));
            assert_eq!(got, expected, "payload: {raw}");
        }
    }
}
