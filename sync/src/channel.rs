//! Correlated messaging channel.
//!
//! Carries three message shapes between peers: best-effort events,
//! retried requests, and their replies. Requests are correlated to
//! replies by request kind alone, so at most one request of a given
//! kind is pending at any time; issuing a new one supersedes (cancels)
//! the old one before the new one starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::message::{decode_payload, encode_payload, MessageTag, Payload};
use crate::transport::PeerTransport;

/// Outcome callbacks for one pending request.
///
/// Exactly one terminal callback fires per `send_request` call:
/// `processed` on reply, `timeout` when the retry window elapses, or
/// `cancelled` on explicit cancellation or supersession.
pub trait RequestListener: Send + Sync + 'static {
    fn processed(&self, reply: Payload);
    fn timeout(&self);
    fn cancelled(&self);
}

/// Handlers for inbound requests and events, supplied by the owning
/// subsystem.
pub trait InboundHandler: Send + Sync + 'static {
    fn request_received(&self, kind: &str, payload: Payload);
    fn event_received(&self, tag: &str, payload: Payload);
}

/// Retry timing for pending requests.
///
/// One constant pair applies to every request kind.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Interval between send attempts.
    pub interval: Duration,
    /// Overall deadline after which the listener's timeout fires.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Number of send attempts before the timeout: `ceil(timeout/interval)`.
    pub fn attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let timeout = self.timeout.as_millis();
        (timeout.div_ceil(interval)).max(1) as u32
    }
}

/// Ephemeral state for one outstanding request.
struct Pending {
    listener: Arc<dyn RequestListener>,
    cancel: Arc<Notify>,
    /// Distinguishes this instance from a later request of the same
    /// kind when its retry task races the supersession.
    epoch: u64,
}

struct ChannelInner {
    transport: Arc<dyn PeerTransport>,
    handler: Arc<dyn InboundHandler>,
    pending: DashMap<String, Pending>,
    policy: RetryPolicy,
    epochs: AtomicU64,
}

impl ChannelInner {
    /// Send a tagged payload to every live peer, best effort.
    ///
    /// Individual send failures are logged and do not abort the loop.
    fn broadcast(&self, tag: &str, bytes: &[u8]) -> usize {
        let mut delivered = 0;
        for peer in self.transport.peers() {
            match self.transport.send(&peer, tag, bytes) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(peer = %peer, tag, error = %e, "send failed");
                }
            }
        }
        delivered
    }
}

/// The correlated messaging channel.
///
/// Cheap to clone; clones share the pending-request registry.
#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<ChannelInner>,
}

impl MessageChannel {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        handler: Arc<dyn InboundHandler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                transport,
                handler,
                pending: DashMap::new(),
                policy,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// Send a fire-and-forget event to every connected peer.
    ///
    /// No retry, no acknowledgment. Returns how many peers accepted the
    /// send.
    pub fn send_event(&self, event_kind: &str, payload: &Payload) -> usize {
        let tag = MessageTag::Event(event_kind.to_string()).encode();
        let bytes = encode_payload(payload);
        self.inner.broadcast(&tag, &bytes)
    }

    /// Start (or restart) a correlated request.
    ///
    /// Any request of the same kind already pending is cancelled first;
    /// its listener receives the cancellation notice before the new
    /// request starts. The payload is then resent every
    /// `policy.interval` until a matching reply arrives, the policy
    /// timeout elapses, or the request is cancelled.
    pub fn send_request(
        &self,
        request_kind: &str,
        listener: Arc<dyn RequestListener>,
        payload: &Payload,
    ) {
        self.supersede(request_kind);

        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = Arc::new(Notify::new());
        self.inner.pending.insert(
            request_kind.to_string(),
            Pending {
                listener,
                cancel: Arc::clone(&cancel),
                epoch,
            },
        );

        let inner = Arc::clone(&self.inner);
        let kind = request_kind.to_string();
        let tag = MessageTag::Request(kind.clone()).encode();
        let bytes = encode_payload(payload);

        tokio::spawn(async move {
            let attempts = inner.policy.attempts();
            for attempt in 1..=attempts {
                let delivered = inner.broadcast(&tag, &bytes);
                if delivered == 0 {
                    tracing::debug!(kind = %kind, attempt, "no peer reachable");
                }
                tokio::select! {
                    _ = cancel.notified() => return,
                    _ = tokio::time::sleep(inner.policy.interval) => {}
                }
            }

            // Deadline reached. The epoch check keeps a stale timer from
            // removing a newer request of the same kind.
            if let Some((_, pending)) = inner.pending.remove_if(&kind, |_, p| p.epoch == epoch) {
                tracing::info!(kind = %kind, "request timed out");
                pending.listener.timeout();
            }
        });
    }

    /// Reply to a previously received request. Sent once, best effort.
    pub fn reply_to_request(&self, request_kind: &str, payload: &Payload) -> usize {
        let tag = MessageTag::RequestReply(request_kind.to_string()).encode();
        let bytes = encode_payload(payload);
        self.inner.broadcast(&tag, &bytes)
    }

    /// Explicitly cancel a pending request.
    ///
    /// Returns whether a request of that kind was pending.
    pub fn cancel_request(&self, request_kind: &str) -> bool {
        match self.inner.pending.remove(request_kind) {
            Some((_, pending)) => {
                pending.cancel.notify_one();
                pending.listener.cancelled();
                true
            }
            None => false,
        }
    }

    /// Dispatch one inbound message from the transport.
    ///
    /// Replies route to the matching pending request; requests and
    /// events route to the owning subsystem's handlers.
    pub fn handle_incoming(&self, tag: &str, bytes: &[u8]) {
        let Some(payload) = decode_payload(bytes) else {
            return;
        };

        match MessageTag::parse(tag) {
            MessageTag::RequestReply(kind) => match self.inner.pending.remove(&kind) {
                Some((_, pending)) => {
                    pending.cancel.notify_one();
                    pending.listener.processed(payload);
                }
                None => {
                    tracing::debug!(kind = %kind, "reply with no pending request");
                }
            },
            MessageTag::Request(kind) => {
                self.inner.handler.request_received(&kind, payload);
            }
            MessageTag::Event(event) => {
                self.inner.handler.event_received(&event, payload);
            }
        }
    }

    /// Whether a request of the given kind is currently pending.
    pub fn has_pending(&self, request_kind: &str) -> bool {
        self.inner.pending.contains_key(request_kind)
    }

    /// Number of outstanding requests across all kinds.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    fn supersede(&self, request_kind: &str) {
        if let Some((_, old)) = self.inner.pending.remove(request_kind) {
            tracing::debug!(kind = %request_kind, "superseding pending request");
            old.cancel.notify_one();
            old.listener.cancelled();
        }
    }
}
