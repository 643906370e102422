//! Persisted settings.
//!
//! A reserved table stores arbitrary serialized parameter values keyed
//! by (owner, parameter tag). Values are opaque blobs decoded by the
//! caller's expected type. Both the generic current-patient-id setting
//! and per-feature parameters live here.

use crate::error::Result;
use crate::predicate::Predicate;
use crate::schema::{FieldDef, FieldType, Origin, TableSchema};
use crate::store::{Select, Store};

/// Name of the reserved settings table.
pub const SETTINGS_TABLE: &str = "settings";

/// Owner tag used by the store's own parameters.
pub const OWNER_VIGIL: &str = "vigil";

const TAG_PATIENT_ID: &str = "patient-id";

/// Schema of the reserved settings table.
pub fn settings_schema() -> TableSchema {
    TableSchema::new(
        SETTINGS_TABLE,
        Origin::Unknown,
        vec![
            FieldDef::new("owner", FieldType::Text),
            FieldDef::new("tag", FieldType::Text),
            FieldDef::new("value", FieldType::Blob),
        ],
    )
}

/// Typed access to the settings table of a store.
pub struct Settings<'a> {
    store: &'a Store,
}

impl<'a> Settings<'a> {
    /// Wrap a store. The settings table must already be defined.
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Write (or overwrite) a parameter value.
    pub fn set(&self, owner: &str, tag: &str, value: Vec<u8>) -> Result<bool> {
        self.store.fetch_and_add(
            SETTINGS_TABLE,
            &[("owner", owner.into()), ("tag", tag.into())],
            &[("value", value.into())],
        )
    }

    /// Read a parameter value, if one was ever written.
    pub fn get(&self, owner: &str, tag: &str) -> Result<Option<Vec<u8>>> {
        let mut cursor = self.store.fetch(
            SETTINGS_TABLE,
            &[Select::field("value")],
            &[
                Predicate::equal("owner", owner),
                Predicate::equal("tag", tag),
            ],
            Some(1),
        )?;
        if cursor.advance() {
            Ok(cursor.blob("value").map(<[u8]>::to_vec))
        } else {
            Ok(None)
        }
    }

    /// Store the current patient identifier.
    pub fn set_current_patient(&self, patient_id: &str) -> Result<bool> {
        self.set(OWNER_VIGIL, TAG_PATIENT_ID, patient_id.as_bytes().to_vec())
    }

    /// The current patient identifier, if set.
    pub fn current_patient(&self) -> Result<Option<String>> {
        Ok(self
            .get(OWNER_VIGIL, TAG_PATIENT_ID)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}
