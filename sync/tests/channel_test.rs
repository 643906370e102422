//! Integration tests for the correlated messaging channel: request
//! supersession, reply correlation, and retry/timeout behavior under
//! virtual time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use vigil_sync::{
    DeliveryError, InboundHandler, MessageChannel, Payload, PeerId, PeerTransport,
    RequestListener, RetryPolicy,
};

#[derive(Debug, PartialEq)]
enum Outcome {
    Processed(Payload),
    Timeout,
    Cancelled,
}

#[derive(Default)]
struct Recorder {
    outcomes: Mutex<Vec<Outcome>>,
}

impl Recorder {
    fn outcomes(&self) -> Vec<String> {
        self.outcomes
            .lock()
            .iter()
            .map(|o| match o {
                Outcome::Processed(_) => "processed".to_string(),
                Outcome::Timeout => "timeout".to_string(),
                Outcome::Cancelled => "cancelled".to_string(),
            })
            .collect()
    }
}

impl RequestListener for Recorder {
    fn processed(&self, reply: Payload) {
        self.outcomes.lock().push(Outcome::Processed(reply));
    }

    fn timeout(&self) {
        self.outcomes.lock().push(Outcome::Timeout);
    }

    fn cancelled(&self) {
        self.outcomes.lock().push(Outcome::Cancelled);
    }
}

#[derive(Default)]
struct SilentHandler {
    requests: Mutex<Vec<(String, Payload)>>,
    events: Mutex<Vec<(String, Payload)>>,
}

impl InboundHandler for SilentHandler {
    fn request_received(&self, kind: &str, payload: Payload) {
        self.requests.lock().push((kind.to_string(), payload));
    }

    fn event_received(&self, tag: &str, payload: Payload) {
        self.events.lock().push((tag.to_string(), payload));
    }
}

/// Transport with no reachable peers; counts broadcast attempts.
#[derive(Default)]
struct DeadTransport {
    attempts: AtomicUsize,
}

impl PeerTransport for DeadTransport {
    fn peers(&self) -> Vec<PeerId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }

    fn send(&self, _peer: &PeerId, _tag: &str, _payload: &[u8]) -> Result<(), DeliveryError> {
        unreachable!("no peers to send to")
    }
}

/// Transport with one healthy peer; records every send.
#[derive(Default)]
struct OnePeerTransport {
    sent: Mutex<Vec<String>>,
}

impl PeerTransport for OnePeerTransport {
    fn peers(&self) -> Vec<PeerId> {
        vec!["watch".to_string()]
    }

    fn send(&self, _peer: &PeerId, tag: &str, _payload: &[u8]) -> Result<(), DeliveryError> {
        self.sent.lock().push(tag.to_string());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_peer_times_out_after_sixty_attempts() {
    let transport = Arc::new(DeadTransport::default());
    let handler = Arc::new(SilentHandler::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        handler,
        RetryPolicy::default(), // 5 s interval, 5 min timeout
    );

    let listener = Arc::new(Recorder::default());
    channel.send_request("PING", Arc::clone(&listener) as Arc<dyn RequestListener>, &json!({}));

    // Let the whole retry window elapse in virtual time.
    tokio::time::sleep(Duration::from_secs(301)).await;

    assert_eq!(transport.attempts.load(Ordering::SeqCst), 60);
    assert_eq!(listener.outcomes(), vec!["timeout"]);
    assert!(!channel.has_pending("PING"));
}

#[tokio::test(start_paused = true)]
async fn new_request_supersedes_pending_one() {
    let transport = Arc::new(OnePeerTransport::default());
    let handler = Arc::new(SilentHandler::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        handler,
        RetryPolicy::default(),
    );

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());

    channel.send_request(
        "CURRENT_PATIENT",
        Arc::clone(&first) as Arc<dyn RequestListener>,
        &json!({"seq": 1}),
    );
    channel.send_request(
        "CURRENT_PATIENT",
        Arc::clone(&second) as Arc<dyn RequestListener>,
        &json!({"seq": 2}),
    );

    // The superseded listener hears about it before the new request runs.
    assert_eq!(first.outcomes(), vec!["cancelled"]);
    assert_eq!(channel.pending_count(), 1);

    let reply = serde_json::to_vec(&json!({"patient": "p1"})).unwrap();
    channel.handle_incoming("REQUEST_REPLY:CURRENT_PATIENT", &reply);

    assert_eq!(second.outcomes(), vec!["processed"]);
    assert_eq!(first.outcomes(), vec!["cancelled"]); // unchanged
    assert!(!channel.has_pending("CURRENT_PATIENT"));

    // The reply payload reached the second listener intact.
    let outcomes = second.outcomes.lock();
    match &outcomes[0] {
        Outcome::Processed(payload) => assert_eq!(payload["patient"], "p1"),
        other => panic!("expected processed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn reply_stops_retries() {
    let transport = Arc::new(OnePeerTransport::default());
    let handler = Arc::new(SilentHandler::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        handler,
        RetryPolicy {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(60),
        },
    );

    let listener = Arc::new(Recorder::default());
    channel.send_request("PING", Arc::clone(&listener) as Arc<dyn RequestListener>, &json!({}));

    // First attempt goes out immediately; reply lands mid-window.
    tokio::time::sleep(Duration::from_secs(7)).await;
    channel.handle_incoming("REQUEST_REPLY:PING", b"{}");

    let sent_at_reply = transport.sent.lock().len();
    assert!(sent_at_reply >= 2);

    // No further attempts after the reply.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.sent.lock().len(), sent_at_reply);
    assert_eq!(listener.outcomes(), vec!["processed"]);
}

#[tokio::test(start_paused = true)]
async fn explicit_cancellation_fires_once() {
    let transport = Arc::new(OnePeerTransport::default());
    let handler = Arc::new(SilentHandler::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        handler,
        RetryPolicy::default(),
    );

    let listener = Arc::new(Recorder::default());
    channel.send_request("PING", Arc::clone(&listener) as Arc<dyn RequestListener>, &json!({}));

    assert!(channel.cancel_request("PING"));
    assert!(!channel.cancel_request("PING")); // nothing left to cancel

    // The retry window elapsing afterwards must not add a timeout.
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(listener.outcomes(), vec!["cancelled"]);
}

#[tokio::test(start_paused = true)]
async fn inbound_dispatch_by_tag_shape() {
    let transport = Arc::new(OnePeerTransport::default());
    let handler = Arc::new(SilentHandler::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        Arc::clone(&handler) as Arc<dyn InboundHandler>,
        RetryPolicy::default(),
    );

    let request = serde_json::to_vec(&json!({"q": "patient"})).unwrap();
    channel.handle_incoming("REQUEST:CURRENT_PATIENT", &request);

    let event = serde_json::to_vec(&json!({"level": 3})).unwrap();
    channel.handle_incoming("ALERT", &event);

    // Reply without a pending request is dropped quietly.
    channel.handle_incoming("REQUEST_REPLY:CURRENT_PATIENT", b"{}");

    let requests = handler.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "CURRENT_PATIENT");

    let events = handler.events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "ALERT");
}

#[tokio::test(start_paused = true)]
async fn inbound_requests_execute_through_the_dispatch_table() {
    use vigil_sync::CommandRegistry;

    /// Handler answering requests via an explicit command table.
    struct DispatchingHandler {
        registry: CommandRegistry,
        replies: Mutex<Vec<(String, Payload)>>,
        unknown: Mutex<Vec<String>>,
    }

    impl InboundHandler for DispatchingHandler {
        fn request_received(&self, kind: &str, payload: Payload) {
            match self.registry.dispatch(kind, payload) {
                Ok(reply) => self.replies.lock().push((kind.to_string(), reply)),
                Err(_) => self.unknown.lock().push(kind.to_string()),
            }
        }

        fn event_received(&self, _tag: &str, _payload: Payload) {}
    }

    let mut registry = CommandRegistry::new();
    registry.register("CURRENT_PATIENT", |_| Ok(json!({"patient": "p1"})));

    let handler = Arc::new(DispatchingHandler {
        registry,
        replies: Mutex::new(Vec::new()),
        unknown: Mutex::new(Vec::new()),
    });
    let transport = Arc::new(OnePeerTransport::default());
    let channel = MessageChannel::new(
        Arc::clone(&transport) as Arc<dyn PeerTransport>,
        Arc::clone(&handler) as Arc<dyn InboundHandler>,
        RetryPolicy::default(),
    );

    channel.handle_incoming("REQUEST:CURRENT_PATIENT", b"{}");

    let (kind, reply) = handler.replies.lock()[0].clone();
    assert_eq!(kind, "CURRENT_PATIENT");
    assert_eq!(reply["patient"], "p1");

    // Forward the computed reply back to the requesting peer.
    channel.reply_to_request(&kind, &reply);
    assert_eq!(
        transport.sent.lock().last().map(String::as_str),
        Some("REQUEST_REPLY:CURRENT_PATIENT")
    );

    // Unregistered request kinds surface explicitly, not silently.
    channel.handle_incoming("REQUEST:REBOOT", b"{}");
    assert_eq!(*handler.unknown.lock(), vec!["REBOOT".to_string()]);
}
