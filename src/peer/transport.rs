//! Underlying transport capability contract
//!
//! The negotiation core drives a peer-connection capability through this
//! trait and never reaches for the implementation directly; tests substitute
//! a scripted mock, production wires [`RtcPeer`](crate::peer::rtc::RtcPeer).

use async_trait::async_trait;

use crate::signaling::protocol::{IceCandidate, SessionDescription};
use crate::Result;

/// Connection state reported by the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    /// Initial state, connection not yet started
    New,
    /// Connection negotiation in progress
    Connecting,
    /// Connection established successfully
    Connected,
    /// Connectivity lost, may recover
    Disconnected,
    /// Connection failed (terminal)
    Failed,
    /// Connection closed
    Closed,
}

/// Event pushed by the underlying transport into the negotiation queue
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local network-path candidate was discovered
    CandidateDiscovered(IceCandidate),

    /// The transport connection state changed
    ConnectionStateChanged(PeerConnectionState),
}

/// Peer-connection capability consumed by the negotiation core
///
/// Implementations own transport establishment (ICE/DTLS/SRTP); the core only
/// sequences descriptions and candidates through these operations. All
/// operations are asynchronous; callers must not assume synchronous
/// completion. Connection-state changes and local candidate discovery are
/// delivered out-of-band as [`PeerEvent`]s on the channel the implementation
/// was constructed with.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Produce a session description of kind offer
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Produce a session description of kind answer
    ///
    /// Valid only after a remote offer has been applied.
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Record a locally produced description
    ///
    /// May fail with [`Error::DescriptionRejected`](crate::Error::DescriptionRejected).
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply the remote side's description
    ///
    /// May fail with [`Error::DescriptionRejected`](crate::Error::DescriptionRejected).
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote network-path candidate
    ///
    /// May fail with [`Error::CandidateRejected`](crate::Error::CandidateRejected);
    /// rejection is non-fatal and the negotiation continues.
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release the transport; further operations on it are undefined
    async fn close(&self) -> Result<()>;
}
