//! # Vigil Store
//!
//! A typed, dynamically-migrated local table store for the Vigil
//! patient-monitoring platform.
//!
//! This crate holds the data layer shared by the phone and watch sides:
//! schema definitions, row storage, predicate-based queries, and the
//! persisted-settings table. Producers (sensor and location services)
//! write rows here; the sync engine in `vigil-sync` reads them back and
//! marks them committed once delivered.
//!
//! ## Design principles
//!
//! - **Reference-counted lifetime**: the physical SQLite connection
//!   opens on the first [`Store::acquire`] and closes when the last
//!   guard releases, even across concurrent unrelated call sites.
//! - **Self-migrating**: [`Store::define_table`] reconciles the live
//!   column set with the declared schema on every open - additive
//!   changes are cheap, removals and retypes rebuild the table while
//!   preserving row identifiers.
//! - **Resilient by convention**: constraint violations surface as
//!   `false` and empty fetches as empty cursors, so the data layer
//!   never takes the caller down over a transient row-level problem.
//!
//! ## Quick start
//!
//! ```rust
//! use vigil_store::{
//!     FieldDef, FieldType, Origin, Predicate, Select, Store, TableSchema,
//! };
//!
//! let store = Store::in_memory();
//! let guard = store.acquire().unwrap();
//!
//! store
//!     .define_table(TableSchema::new(
//!         "vitals",
//!         Origin::PatientWatch,
//!         vec![
//!             FieldDef::new("patient", FieldType::Text),
//!             FieldDef::new("value", FieldType::Real),
//!             FieldDef::with_default("committed", FieldType::Boolean, false),
//!         ],
//!     ))
//!     .unwrap();
//!
//! store
//!     .add("vitals", &[("patient", "p1".into()), ("value", 3.2.into())])
//!     .unwrap();
//!
//! let mut cursor = store
//!     .fetch(
//!         "vitals",
//!         &[Select::field("value")],
//!         &[Predicate::equal("patient", "p1")],
//!         None,
//!     )
//!     .unwrap();
//! assert!(cursor.advance());
//! assert_eq!(cursor.real("value"), Some(3.2));
//!
//! drop(guard); // last release closes the connection
//! ```

pub mod conn;
pub mod cursor;
pub mod error;
pub mod migrate;
pub mod predicate;
pub mod schema;
pub mod settings;
pub mod store;
pub mod value;

// Re-export main types at crate root
pub use conn::StoreGuard;
pub use cursor::{Cursor, Row};
pub use error::{Result, StoreError};
pub use migrate::MigrationOutcome;
pub use predicate::Predicate;
pub use schema::{FieldDef, FieldType, Origin, TableSchema, ROW_ID};
pub use settings::{settings_schema, Settings, OWNER_VIGIL, SETTINGS_TABLE};
pub use store::{Aggregate, Select, Store};
pub use value::FieldValue;

/// Type aliases for clarity
pub type TableName = String;
pub type RowId = i64;
