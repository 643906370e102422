//! Error types for the Vigil record store.

use crate::TableName;
use thiserror::Error;

/// All possible errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    // Registration errors
    #[error("table already registered: {0}")]
    DuplicateTable(TableName),

    #[error("unknown table: {0}")]
    UnknownTable(TableName),

    #[error("invalid schema for table '{table}': {reason}")]
    InvalidSchema { table: TableName, reason: String },

    // Lifecycle errors
    #[error("store is not open; acquire a guard before calling data operations")]
    NotOpen,

    // Physical engine errors
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
