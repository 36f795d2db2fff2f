//! End-to-end negotiation scenarios over an in-memory relay
//!
//! Two full room sessions (or one session plus hand-crafted envelopes) are
//! driven through the broadcast relay from `support`, which echoes messages
//! to their sender and can duplicate deliveries.

mod support;

use std::sync::Arc;
use std::time::Duration;

use roomlink::{
    IceCandidate, MediaCapture, PeerConnectionState, PeerEvent, PeerTransport, RoomEvent,
    RoomSession, SessionDescription, Signal, SignalEnvelope, SignalingTransport, TrackKind,
};
use support::{drain_events, expect_event, wait_until, MockPeer, RecordingMedia, RelayHub};
use tokio::sync::mpsc;

struct Participant {
    session: RoomSession,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    peer: Arc<MockPeer>,
    media: Arc<RecordingMedia>,
}

async fn join(hub: &Arc<RelayHub>, id: &str) -> Participant {
    let (peer, peer_events) = MockPeer::new();
    join_with(hub, id, peer, peer_events).await
}

async fn join_with(
    hub: &Arc<RelayHub>,
    id: &str,
    peer: Arc<MockPeer>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
) -> Participant {
    support::init_tracing();
    let media = Arc::new(RecordingMedia::default());
    let signaling: Arc<dyn SignalingTransport> = hub.client();
    let (session, events) = RoomSession::join(
        "r1".to_string(),
        id.to_string(),
        signaling,
        Arc::clone(&peer) as Arc<dyn PeerTransport>,
        peer_events,
        Arc::clone(&media) as Arc<dyn MediaCapture>,
    )
    .await
    .unwrap();

    Participant {
        session,
        events,
        peer,
        media,
    }
}

fn env(from: &str, signal: Signal) -> SignalEnvelope {
    SignalEnvelope::new("r1".to_string(), from.to_string(), signal)
}

fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{}", n),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(n),
    }
}

#[tokio::test]
async fn test_two_participants_negotiate_to_connected() {
    let hub = RelayHub::new();
    let mut a = join(&hub, "a").await;
    let mut b = join(&hub, "b").await;

    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Connected);
    assert_eq!(expect_event(&mut b.events).await, RoomEvent::Connected);

    // Deterministic roles: a (smaller id) sent the one offer, b the one answer.
    assert_eq!(hub.count("offer", None), 1);
    assert_eq!(hub.count("offer", Some("a")), 1);
    assert_eq!(hub.count("answer", None), 1);
    assert_eq!(hub.count("answer", Some("b")), 1);

    a.session.leave().unwrap();
    b.session.leave().unwrap();
}

#[tokio::test]
async fn test_duplicate_deliveries_yield_single_offer() {
    let hub = RelayHub::new();
    hub.duplicate_deliveries(true);

    let mut a = join(&hub, "a").await;
    let mut b = join(&hub, "b").await;

    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Connected);
    assert_eq!(expect_event(&mut b.events).await, RoomEvent::Connected);

    // Every join, offer, and answer arrived twice; redelivery changed nothing.
    assert_eq!(hub.count("offer", None), 1);
    assert_eq!(hub.count("answer", None), 1);
}

#[tokio::test]
async fn test_candidate_before_offer_is_buffered_until_description() {
    let hub = RelayHub::new();
    let mut b = join(&hub, "b").await;
    let injector = hub.client();

    injector
        .send("r1", &env("a", Signal::Candidate(candidate(0))))
        .await
        .unwrap();
    injector
        .send("r1", &env("a", Signal::Offer(SessionDescription::offer("their-offer"))))
        .await
        .unwrap();

    wait_until(|| hub.count("answer", Some("b")) == 1).await;

    let set_remote = b.peer.call_index("set_remote(offer)").unwrap();
    let applied = b.peer.call_index("add_candidate(candidate:0)").unwrap();
    let answered = b.peer.call_index("create_answer").unwrap();
    assert!(set_remote < applied);
    assert!(applied < answered);

    assert_eq!(expect_event(&mut b.events).await, RoomEvent::Connected);
}

#[tokio::test]
async fn test_glommed_offer_smaller_id_wins() {
    let hub = RelayHub::new();
    let mut a = join(&hub, "a").await;
    let injector = hub.client();

    injector
        .send("r1", &env("b", Signal::PeerJoined("b".to_string())))
        .await
        .unwrap();
    wait_until(|| hub.count("offer", Some("a")) == 1).await;

    // Simultaneous initiation: the remote's offer loses against a's.
    injector
        .send("r1", &env("b", Signal::Offer(SessionDescription::offer("their-offer"))))
        .await
        .unwrap();
    // The remote concedes and answers a's offer instead.
    injector
        .send("r1", &env("b", Signal::Answer(SessionDescription::answer("their-answer"))))
        .await
        .unwrap();

    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Connected);
    assert_eq!(hub.count("answer", Some("a")), 0);
    assert!(a.peer.call_index("set_remote(offer)").is_none());
}

#[tokio::test]
async fn test_failed_transport_tears_down_exactly_once() {
    let hub = RelayHub::new();
    let mut a = join(&hub, "a").await;

    a.peer.inject(PeerEvent::ConnectionStateChanged(
        PeerConnectionState::Disconnected,
    ));
    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Disconnected);

    a.peer.inject(PeerEvent::ConnectionStateChanged(PeerConnectionState::Failed));
    a.peer.inject(PeerEvent::ConnectionStateChanged(PeerConnectionState::Failed));

    assert!(matches!(expect_event(&mut a.events).await, RoomEvent::Failed(_)));
    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Closed);
    a.session.closed().await;

    assert_eq!(hub.count("peer_left", Some("a")), 1);
    assert_eq!(a.media.stop_count(), 1);
    assert!(a.peer.calls().contains(&"close".to_string()));
}

#[tokio::test]
async fn test_leave_twice_single_departure() {
    let hub = RelayHub::new();
    let a = join(&hub, "a").await;

    a.session.leave().unwrap();
    a.session.leave().unwrap();

    let events = drain_events(a.events).await;
    assert_eq!(events, vec![RoomEvent::Closed]);
    a.session.closed().await;

    assert_eq!(hub.count("peer_left", Some("a")), 1);
    assert_eq!(a.media.stop_count(), 1);
}

#[tokio::test]
async fn test_remote_departure_closes_session() {
    let hub = RelayHub::new();
    let mut a = join(&hub, "a").await;
    let mut b = join(&hub, "b").await;

    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Connected);
    assert_eq!(expect_event(&mut b.events).await, RoomEvent::Connected);

    b.session.leave().unwrap();

    assert_eq!(
        expect_event(&mut a.events).await,
        RoomEvent::PeerLeft("b".to_string())
    );
    assert_eq!(expect_event(&mut a.events).await, RoomEvent::Closed);
    a.session.closed().await;
    b.session.closed().await;

    // One departure announced by each side.
    assert_eq!(hub.count("peer_left", None), 2);
    assert_eq!(a.media.stop_count(), 1);
    assert_eq!(b.media.stop_count(), 1);
}

#[tokio::test]
async fn test_leave_discards_pending_offer_production() {
    let hub = RelayHub::new();
    let (peer, peer_events, gate) = MockPeer::gated();
    let a = join_with(&hub, "a", peer, peer_events).await;
    let injector = hub.client();

    injector
        .send("r1", &env("b", Signal::PeerJoined("b".to_string())))
        .await
        .unwrap();
    // The re-announce shows the join was processed; offer production is now
    // parked behind the gate.
    wait_until(|| hub.count("peer_joined", Some("a")) == 2).await;

    a.session.leave().unwrap();
    a.session.closed().await;

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(hub.count("offer", None), 0);
    assert!(!a.peer.calls().contains(&"set_local(offer)".to_string()));
    assert_eq!(hub.count("peer_left", Some("a")), 1);
}

#[tokio::test]
async fn test_track_toggle_reaches_media() {
    let hub = RelayHub::new();
    let a = join(&hub, "a").await;

    a.session.set_track_enabled(TrackKind::Video, false).unwrap();
    wait_until(|| a.media.toggles() == vec![(TrackKind::Video, false)]).await;

    a.session.leave().unwrap();
}
