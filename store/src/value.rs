//! Typed field values and their SQLite conversions.

use serde::{Deserialize, Serialize};

/// A value stored in (or bound against) a table column.
///
/// Serializes untagged so rows render as plain JSON documents; the
/// variant order puts `Integer` before `Real` so round-tripped whole
/// numbers stay integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Real(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean view. Integer-backed flags read as `!= 0`, matching how
    /// BOOLEAN columns come back from the engine.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert to an owned SQLite value for parameter binding.
    pub(crate) fn to_sql(&self) -> rusqlite::types::Value {
        match self {
            FieldValue::Null => rusqlite::types::Value::Null,
            FieldValue::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
            FieldValue::Integer(i) => rusqlite::types::Value::Integer(*i),
            FieldValue::Real(f) => rusqlite::types::Value::Real(*f),
            FieldValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
            FieldValue::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
        }
    }

    /// Convert a raw SQLite value read from a row.
    pub(crate) fn from_sql(value: rusqlite::types::ValueRef<'_>) -> Self {
        match value {
            rusqlite::types::ValueRef::Null => FieldValue::Null,
            rusqlite::types::ValueRef::Integer(i) => FieldValue::Integer(i),
            rusqlite::types::ValueRef::Real(f) => FieldValue::Real(f),
            rusqlite::types::ValueRef::Text(t) => {
                FieldValue::Text(String::from_utf8_lossy(t).into_owned())
            }
            rusqlite::types::ValueRef::Blob(b) => FieldValue::Blob(b.to_vec()),
        }
    }

    /// Render as a SQL literal for DDL default clauses.
    pub(crate) fn sql_literal(&self) -> String {
        match self {
            FieldValue::Null => "NULL".to_string(),
            FieldValue::Bool(b) => i64::from(*b).to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Real(f) => f.to_string(),
            FieldValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            FieldValue::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Real(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Blob(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        assert_eq!(FieldValue::from("p1").as_text(), Some("p1"));
        assert_eq!(FieldValue::from(42i64).as_i64(), Some(42));
        assert_eq!(FieldValue::from(3.25).as_f64(), Some(3.25));
        assert_eq!(FieldValue::from(7i64).as_f64(), Some(7.0));
        assert_eq!(FieldValue::from(true).as_bool(), Some(true));
        assert_eq!(FieldValue::Integer(1).as_bool(), Some(true));
        assert_eq!(FieldValue::Integer(0).as_bool(), Some(false));
        assert!(FieldValue::Null.is_null());
    }

    #[test]
    fn sql_literals() {
        assert_eq!(FieldValue::from("a'b").sql_literal(), "'a''b'");
        assert_eq!(FieldValue::from(false).sql_literal(), "0");
        assert_eq!(FieldValue::from(12i64).sql_literal(), "12");
        assert_eq!(FieldValue::Blob(vec![0xAB, 0x01]).sql_literal(), "X'AB01'");
        assert_eq!(FieldValue::Null.sql_literal(), "NULL");
    }

    #[test]
    fn serialization_is_untagged() {
        let json = serde_json::to_string(&FieldValue::from(3i64)).unwrap();
        assert_eq!(json, "3");

        let json = serde_json::to_string(&FieldValue::from("hi")).unwrap();
        assert_eq!(json, "\"hi\"");

        let parsed: FieldValue = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, FieldValue::Integer(3));
    }
}
