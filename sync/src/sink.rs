//! Remote sink interface and upload framing.
//!
//! A remote sink accepts named byte payloads (file-like upload or peer
//! message). Rows travel under a deterministic delivery path so the
//! acknowledgment side can map each upload back to the exact row it
//! carried.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use vigil_store::{Origin, RowId};

use crate::transport::DeliveryError;

/// Logical category an upload lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    Data,
    Config,
    Events,
    Requests,
}

impl UploadCategory {
    /// Stable directory tag for the category.
    pub fn tag(self) -> &'static str {
        match self {
            UploadCategory::Data => "data",
            UploadCategory::Config => "config",
            UploadCategory::Events => "events",
            UploadCategory::Requests => "requests",
        }
    }
}

/// External collaborator accepting named byte payloads.
///
/// A successful return is the positive per-row delivery acknowledgment
/// the commit engine keys on. Implementations may block on network I/O;
/// they are only ever called from background tasks.
pub trait RemoteSink: Send + Sync {
    fn deliver(&self, path: &str, bytes: &[u8]) -> Result<(), DeliveryError>;
}

/// Deterministic delivery path for one row: `/<table>/<row-id>`.
pub fn row_path(table: &str, row_id: RowId) -> String {
    format!("/{table}/{row_id}")
}

/// Invert [`row_path`], for acknowledgment callbacks.
pub fn parse_row_path(path: &str) -> Option<(String, RowId)> {
    let mut parts = path.strip_prefix('/')?.splitn(2, '/');
    let table = parts.next()?;
    let row_id: RowId = parts.next()?.parse().ok()?;
    if table.is_empty() {
        return None;
    }
    Some((table.to_string(), row_id))
}

/// Generates deterministic upload file names:
/// `<senderId>_<YYYYMMDD-HHMMSS>_<originTag>_<messageTag>_<sequence>`.
pub struct UploadNamer {
    sender_id: String,
    sequence: AtomicU64,
}

impl UploadNamer {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Produce the next upload name in sequence.
    pub fn next(&self, at: DateTime<Utc>, origin: Origin, message_tag: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{}_{}_{}",
            self.sender_id,
            at.format("%Y%m%d-%H%M%S"),
            origin.tag(),
            message_tag,
            sequence
        )
    }
}
