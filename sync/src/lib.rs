//! # Vigil Sync
//!
//! Peer messaging and commit tracking for the Vigil patient-monitoring
//! platform.
//!
//! This crate moves locally buffered records to a remote sink exactly
//! once, despite drops, restarts, and concurrent producers, and carries
//! the correlated request/reply protocol between the phone and its
//! companion wearable.
//!
//! ## Components
//!
//! - [`MessageChannel`] - event broadcast plus request/response
//!   exchange over an externally supplied [`PeerTransport`]. Requests
//!   retry on a fixed interval until a reply, a timeout, or
//!   cancellation; at most one request per kind is outstanding.
//! - [`SyncEngine`] - enumerates uncommitted rows from monitored
//!   tables, pushes each through a [`RemoteSink`] under the
//!   deterministic `/<table>/<row-id>` path, and marks rows committed
//!   one acknowledgment at a time.
//! - [`CommitScheduler`] - periodic driver with catch-up-on-start
//!   semantics.
//! - [`CommandRegistry`] - explicit string-keyed dispatch for remote
//!   callback execution.
//!
//! Transport and sink specifics (BLE bridge, SSH/SCP, HTTPS) stay
//! outside this crate, behind the two traits.

pub mod channel;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod schedule;
pub mod sink;
pub mod transport;

// Re-export main types at crate root
pub use channel::{InboundHandler, MessageChannel, RequestListener, RetryPolicy};
pub use commands::{CommandFn, CommandRegistry};
pub use config::{ConfigError, SyncConfig};
pub use engine::{CommitOptions, CommitReport, SyncEngine};
pub use error::{Result, SyncError};
pub use message::{MessageTag, Payload};
pub use schedule::{now_ms, CommitScheduler};
pub use sink::{parse_row_path, row_path, RemoteSink, UploadCategory, UploadNamer};
pub use transport::{DeliveryError, PeerId, PeerTransport};
