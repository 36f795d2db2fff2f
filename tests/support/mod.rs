//! Test doubles for negotiation scenarios: an in-memory broadcast relay, a
//! scripted peer transport, and a recording media collaborator.
//!
//! The relay mimics the production signaling server's contract: every sent
//! envelope is delivered to every subscriber of the hub, the sender included,
//! and deliveries can be doubled to exercise at-least-once redelivery.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use roomlink::{
    Error, IceCandidate, MediaCapture, PeerConnectionState, PeerEvent, PeerTransport, Result,
    RoomEvent, SessionDescription, SignalEnvelope, SignalingTransport, TrackKind,
};

/// Broadcast relay shared by every client in a test
pub struct RelayHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SignalEnvelope>>>,
    history: Mutex<Vec<SignalEnvelope>>,
    duplicate: AtomicBool,
}

impl RelayHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            duplicate: AtomicBool::new(false),
        })
    }

    /// Deliver every subsequent message twice to every subscriber
    pub fn duplicate_deliveries(&self, enabled: bool) {
        self.duplicate.store(enabled, Ordering::SeqCst);
    }

    /// Create a client; its subscription starts buffering immediately
    pub fn client(self: &Arc<Self>) -> Arc<RelayClient> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Arc::new(RelayClient {
            hub: Arc::clone(self),
            subscription: Mutex::new(Some(rx)),
        })
    }

    /// Everything sent through the hub, in order, deduplicated
    pub fn history(&self) -> Vec<SignalEnvelope> {
        self.history.lock().unwrap().clone()
    }

    /// Count sent messages of one kind, optionally from one sender
    pub fn count(&self, kind: &str, from: Option<&str>) -> usize {
        self.history()
            .iter()
            .filter(|e| e.signal.kind_name() == kind)
            .filter(|e| from.map_or(true, |f| e.from_participant == f))
            .count()
    }

    fn broadcast(&self, envelope: &SignalEnvelope) {
        self.history.lock().unwrap().push(envelope.clone());
        let copies = if self.duplicate.load(Ordering::SeqCst) { 2 } else { 1 };
        let subscribers = self.subscribers.lock().unwrap();
        for _ in 0..copies {
            for subscriber in subscribers.iter() {
                let _ = subscriber.send(envelope.clone());
            }
        }
    }
}

/// One participant's connection to the relay hub
pub struct RelayClient {
    hub: Arc<RelayHub>,
    subscription: Mutex<Option<mpsc::UnboundedReceiver<SignalEnvelope>>>,
}

#[async_trait]
impl SignalingTransport for RelayClient {
    async fn send(&self, _room_id: &str, message: &SignalEnvelope) -> Result<()> {
        self.hub.broadcast(message);
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<SignalEnvelope>> {
        self.subscription
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::SignalingError("already subscribed".to_string()))
    }
}

/// Scripted peer transport
///
/// Records every operation, reports `connected` once both descriptions are
/// set (as a real transport would once negotiation completes), and can gate
/// offer production so tests interleave teardown with it.
pub struct MockPeer {
    calls: Mutex<Vec<String>>,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    events: mpsc::UnboundedSender<PeerEvent>,
    offer_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockPeer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let peer = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            events,
            offer_gate: Mutex::new(None),
        });
        (peer, events_rx)
    }

    /// A peer whose offer production blocks until the returned gate is notified
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>, Arc<Notify>) {
        let (peer, events_rx) = Self::new();
        let gate = Arc::new(Notify::new());
        *peer.offer_gate.lock().unwrap() = Some(Arc::clone(&gate));
        (peer, events_rx, gate)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Position of the first call matching `needle`, if any
    pub fn call_index(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == needle)
    }

    /// Push a transport event into the session's serialized queue
    pub fn inject(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    fn maybe_connected(&self) {
        if self.local_set.load(Ordering::SeqCst) && self.remote_set.load(Ordering::SeqCst) {
            let _ = self.events.send(PeerEvent::ConnectionStateChanged(
                PeerConnectionState::Connected,
            ));
        }
    }
}

#[async_trait]
impl PeerTransport for MockPeer {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let gate = self.offer_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record("create_offer");
        Ok(SessionDescription::offer("mock-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record("create_answer");
        Ok(SessionDescription::answer("mock-answer"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(format!("set_local({})", desc.kind));
        self.local_set.store(true, Ordering::SeqCst);
        self.maybe_connected();
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(format!("set_remote({})", desc.kind));
        self.remote_set.store(true, Ordering::SeqCst);
        self.maybe_connected();
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(format!("add_candidate({})", candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        Ok(())
    }
}

/// Media collaborator that records toggles and stop calls
#[derive(Default)]
pub struct RecordingMedia {
    stops: AtomicUsize,
    toggles: Mutex<Vec<(TrackKind, bool)>>,
}

impl RecordingMedia {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn toggles(&self) -> Vec<(TrackKind, bool)> {
        self.toggles.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaCapture for RecordingMedia {
    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) {
        self.toggles.lock().unwrap().push((kind, enabled));
    }

    async fn stop_all_tracks(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Install a log subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Receive the next room event or fail after two seconds
pub async fn expect_event(rx: &mut mpsc::UnboundedReceiver<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for room event")
        .expect("room event channel closed")
}

/// Drain room events until the session's loop terminates and the channel closes
pub async fn drain_events(mut rx: mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            Ok(None) => break,
            Err(_) => panic!("timed out draining room events"),
        }
    }
    events
}

/// Poll a predicate until it holds or two seconds elapse
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within timeout");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
