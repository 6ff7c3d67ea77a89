use serde_json::{Map, Value};

/// A generic table row keyed by column name
///
/// Rows of the patient-facing tables are passed through to callers as-is, so
/// they are kept as JSON objects rather than typed records.
pub type Row = Map<String, Value>;

/// Convert one SQLite column value into JSON
pub fn sqlite_value_to_json(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        // Blobs (photos, signatures) are served base64-encoded by the hosted store;
        // here they are returned as a byte array.
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Convert a JSON value into something SQLite can bind
pub fn json_to_sqlite_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as SqlValue;

    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
