//! Table schema definitions.
//!
//! Schemas identify a table by name and origin device, and carry the
//! ordered field list that drives table creation and reconciliation.
//! The auto-incrementing row id is implicit and never part of the
//! field list.

use crate::value::FieldValue;
use crate::TableName;
use serde::{Deserialize, Serialize};

/// Name of the implicit auto-increment row id column.
pub const ROW_ID: &str = "id";

/// Which physical device produced a table's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    Unknown,
    PatientPhone,
    PatientWatch,
    CaregiverPhone,
}

impl Origin {
    /// Stable string tag, used in upload names and logs.
    pub fn tag(self) -> &'static str {
        match self {
            Origin::Unknown => "unknown",
            Origin::PatientPhone => "patient-phone",
            Origin::PatientWatch => "patient-watch",
            Origin::CaregiverPhone => "caregiver-phone",
        }
    }
}

/// Column types supported in table schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Text,
    UniqueText,
    Real,
    Integer,
    Boolean,
    BigInt,
    Blob,
}

impl FieldType {
    /// The declared column type as it appears in `pragma_table_info`.
    ///
    /// Uniqueness is a column constraint, not part of the type, so
    /// `Text` and `UniqueText` share the same column type.
    pub fn column_type(self) -> &'static str {
        match self {
            FieldType::Text | FieldType::UniqueText => "TEXT",
            FieldType::Real => "REAL",
            FieldType::Integer => "INTEGER",
            FieldType::Boolean => "BOOLEAN",
            FieldType::BigInt => "BIGINT",
            FieldType::Blob => "BLOB",
        }
    }

    /// The full DDL fragment for a column of this type.
    pub fn ddl(self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::UniqueText => "TEXT UNIQUE",
            FieldType::Real => "REAL",
            FieldType::Integer => "INTEGER",
            FieldType::Boolean => "BOOLEAN",
            FieldType::BigInt => "BIGINT",
            FieldType::Blob => "BLOB",
        }
    }
}

/// Definition of a single field in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Default value applied when `add` omits the field
    pub default: Option<FieldValue>,
}

impl FieldDef {
    /// Create a field definition without a default.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    /// Create a field definition with a declared default value.
    pub fn with_default(
        name: impl Into<String>,
        field_type: FieldType,
        default: impl Into<FieldValue>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: Some(default.into()),
        }
    }
}

/// Schema for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Globally unique table name
    pub name: TableName,
    /// Device that produces this table's data
    pub origin: Origin,
    /// Ordered field definitions (row id excluded)
    pub fields: Vec<FieldDef>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(name: impl Into<TableName>, origin: Origin, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            origin,
            fields,
        }
    }

    /// Look up a field definition by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check structural invariants: no reserved names, no duplicates.
    pub fn validate(&self) -> crate::error::Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.name == ROW_ID {
                return Err(crate::error::StoreError::InvalidSchema {
                    table: self.name.clone(),
                    reason: format!("field name '{ROW_ID}' is reserved for the row id"),
                });
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(crate::error::StoreError::InvalidSchema {
                    table: self.name.clone(),
                    reason: format!("duplicate field name '{}'", field.name),
                });
            }
        }
        Ok(())
    }
}
