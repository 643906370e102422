//! Error types for the Vigil sync layer.

use thiserror::Error;

use crate::transport::DeliveryError;

/// All possible errors from the messaging channel and sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A commit cycle is already running on this engine instance.
    #[error("commit cycle already in progress")]
    AlreadyInProgress,

    /// A monitored table does not declare the committed flag field.
    #[error("table '{0}' has no committed flag field")]
    MissingCommitFlag(String),

    #[error("invalid row delivery path: {0}")]
    InvalidRowPath(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
