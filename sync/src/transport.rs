//! The byte-oriented peer transport seam.
//!
//! Transport specifics (BLE bridge, SSH, push messaging) live outside
//! this crate. The sync layer only needs to enumerate live peers and
//! send a named payload to one; inbound bytes are handed back through
//! [`crate::channel::MessageChannel::handle_incoming`].

use thiserror::Error;

/// Identifies a connected peer device.
pub type PeerId = String;

/// A transport-level send failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Byte transport between this device and its peers.
///
/// Implementations may block on network I/O; they are only ever called
/// from background tasks.
pub trait PeerTransport: Send + Sync {
    /// Enumerate currently reachable peers.
    fn peers(&self) -> Vec<PeerId>;

    /// Send a tagged payload to one peer.
    fn send(&self, peer: &PeerId, tag: &str, payload: &[u8]) -> Result<(), DeliveryError>;
}
