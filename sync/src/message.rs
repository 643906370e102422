//! Wire message tags and payloads.
//!
//! Three message shapes travel between peers: fire-and-forget events,
//! retried requests, and their replies. The shape is encoded in the
//! message tag; the payload is a structured JSON document carried as
//! opaque bytes by the transport.

/// Payload of any message: a structured key/value document whose values
/// are primitives or nested documents/arrays.
pub type Payload = serde_json::Value;

const REQUEST_PREFIX: &str = "REQUEST:";
const REQUEST_REPLY_PREFIX: &str = "REQUEST_REPLY:";

/// A classified message tag.
///
/// Requests and replies share a request kind and are correlated only by
/// that kind, not by a message id. Anything matching neither prefix is
/// an event tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTag {
    Request(String),
    RequestReply(String),
    Event(String),
}

impl MessageTag {
    /// Classify a raw wire tag.
    pub fn parse(tag: &str) -> Self {
        if let Some(kind) = tag.strip_prefix(REQUEST_REPLY_PREFIX) {
            MessageTag::RequestReply(kind.to_string())
        } else if let Some(kind) = tag.strip_prefix(REQUEST_PREFIX) {
            MessageTag::Request(kind.to_string())
        } else {
            MessageTag::Event(tag.to_string())
        }
    }

    /// Render back to the wire form.
    pub fn encode(&self) -> String {
        match self {
            MessageTag::Request(kind) => format!("{REQUEST_PREFIX}{kind}"),
            MessageTag::RequestReply(kind) => format!("{REQUEST_REPLY_PREFIX}{kind}"),
            MessageTag::Event(tag) => tag.clone(),
        }
    }
}

/// Serialize a payload for the transport.
///
/// Serializing a JSON value only fails on non-string map keys, which
/// `Payload` cannot represent; a failure logs and yields an empty body.
pub(crate) fn encode_payload(payload: &Payload) -> Vec<u8> {
    serde_json::to_vec(payload).unwrap_or_else(|e| {
        tracing::error!(error = %e, "payload serialization failed");
        Vec::new()
    })
}

/// Parse inbound payload bytes. Empty bodies decode as `null`.
pub(crate) fn decode_payload(bytes: &[u8]) -> Option<Payload> {
    if bytes.is_empty() {
        return Some(Payload::Null);
    }
    match serde_json::from_slice(bytes) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, "dropping unparseable inbound payload");
            None
        }
    }
}
