//! Two-party WebRTC room negotiation
//!
//! This crate implements the negotiation core for peer-to-peer audio/video
//! calls: two participants in a shared room exchange session descriptions and
//! ICE candidates through a relayed signaling channel, then hand off to a
//! direct transport. It decides who initiates, sequences the offer/answer
//! exchange, buffers candidates that arrive early, and reconciles transport
//! connection states with idempotent teardown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  RoomSession (one serialized event task per room)    │
//! │  ├─ SignalingBridge ── SignalingTransport (relay)    │
//! │  ├─ RoleResolver (who initiates)                     │
//! │  ├─ NegotiationStateMachine                          │
//! │  │   ├─ CandidateBuffer (early candidates)           │
//! │  │   └─ PeerTransport (webrtc peer connection)       │
//! │  └─ ConnectionLifecycleMonitor ── MediaCapture       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Signaling relay, media capture, and transport establishment are external
//! collaborators behind traits; the crate ships one implementation of each
//! ([`WebSocketSignaling`], [`LocalTracks`], [`RtcPeer`]) and tests against
//! mocks.
//!
//! # Example
//!
//! ```ignore
//! use roomlink::{RoomConfig, RoomEvent, RoomSession, TrackKind};
//!
//! let config = RoomConfig {
//!     signaling_url: "wss://signal.example.com/rooms".to_string(),
//!     room_id: "r1".to_string(),
//!     ..Default::default()
//! };
//!
//! let (session, mut events) = RoomSession::connect(config).await?;
//! session.set_track_enabled(TrackKind::Audio, false)?; // start muted
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RoomEvent::Connected => println!("call is up"),
//!         RoomEvent::Closed => break,
//!         _ => {}
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod peer;
pub mod room;
pub mod signaling;

pub use config::{RoomConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{LocalTracks, MediaCapture, TrackKind};
pub use negotiation::{NegotiationState, Role};
pub use peer::{PeerConnectionState, PeerEvent, PeerTransport, RtcPeer};
pub use room::{RoomEvent, RoomSession};
pub use signaling::{
    IceCandidate, ParticipantId, RoomId, SdpKind, SessionDescription, Signal, SignalEnvelope,
    SignalingTransport, WebSocketSignaling,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
