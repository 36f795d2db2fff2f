//! Signaling: envelope protocol, relay transport, and the routing bridge

pub mod bridge;
pub mod protocol;
pub mod websocket;

pub use bridge::{InboundSignal, SignalingBridge, SignalingTransport};
pub use protocol::{
    IceCandidate, ParticipantId, RoomId, SdpKind, SessionDescription, Signal, SignalEnvelope,
};
pub use websocket::WebSocketSignaling;
