//! Peer-connection capability: the contract the core drives, and its
//! `webrtc`-backed implementation

pub mod rtc;
pub mod transport;

pub use rtc::RtcPeer;
pub use transport::{PeerConnectionState, PeerEvent, PeerTransport};
