//! Routing between the signaling relay and the negotiation core
//!
//! The bridge is the only component that sees raw [`SignalEnvelope`]s. It
//! discards self-originated echoes and foreign-room traffic, turns the rest
//! into typed inbound signals, and tags everything the machine emits with the
//! room and local participant ids so the remote side can filter it in turn.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::signaling::protocol::{
    IceCandidate, ParticipantId, RoomId, SessionDescription, Signal, SignalEnvelope,
};
use crate::Result;

/// Relayed signaling channel consumed by the bridge
///
/// Reliability, ordering, and at-least-once redelivery are properties of the
/// relay; the negotiation core tolerates redelivery but requires that
/// messages for a room eventually reach every subscribed participant.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Transmit one envelope to the room's relay
    async fn send(&self, room_id: &str, message: &SignalEnvelope) -> Result<()>;

    /// Obtain the inbound message sequence
    ///
    /// Single-subscriber: a second call fails.
    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<SignalEnvelope>>;
}

/// Inbound signaling message after filtering, ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum InboundSignal {
    /// Remote offer; sender id retained for glom tie-breaking
    Offer {
        /// Originating participant
        from: ParticipantId,
        /// The offered description
        description: SessionDescription,
    },
    /// Remote answer
    Answer(SessionDescription),
    /// Remote network-path candidate
    Candidate(IceCandidate),
    /// A participant joined the room
    PeerJoined(ParticipantId),
    /// A participant left the room
    PeerLeft(ParticipantId),
}

/// Maps between raw envelopes and the negotiation core's vocabulary
pub struct SignalingBridge {
    room_id: RoomId,
    local_id: ParticipantId,
    transport: Arc<dyn SignalingTransport>,
}

impl SignalingBridge {
    /// Create a bridge for one room and local participant
    pub fn new(
        room_id: RoomId,
        local_id: ParticipantId,
        transport: Arc<dyn SignalingTransport>,
    ) -> Self {
        Self {
            room_id,
            local_id,
            transport,
        }
    }

    /// Local participant id this bridge filters against
    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Room this bridge serves
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Filter and classify an inbound envelope
    ///
    /// Returns `None` for self-originated echoes and foreign-room traffic.
    pub fn route(&self, envelope: SignalEnvelope) -> Option<InboundSignal> {
        if envelope.room_id != self.room_id {
            debug!(
                room = %self.room_id,
                foreign = %envelope.room_id,
                "discarding envelope for foreign room"
            );
            return None;
        }
        if envelope.from_participant == self.local_id {
            debug!(room = %self.room_id, "discarding self-originated echo");
            return None;
        }

        let from = envelope.from_participant;
        Some(match envelope.signal {
            Signal::Offer(description) => InboundSignal::Offer { from, description },
            Signal::Answer(description) => InboundSignal::Answer(description),
            Signal::Candidate(candidate) => InboundSignal::Candidate(candidate),
            Signal::PeerJoined(id) => InboundSignal::PeerJoined(id),
            Signal::PeerLeft(id) => InboundSignal::PeerLeft(id),
        })
    }

    /// Transmit a machine-emitted payload, tagged with room and sender
    pub async fn publish(&self, signal: Signal) -> Result<()> {
        let envelope =
            SignalEnvelope::new(self.room_id.clone(), self.local_id.clone(), signal);
        self.transport.send(&self.room_id, &envelope).await
    }

    /// Announce the local participant to the room
    pub async fn send_join(&self) -> Result<()> {
        self.publish(Signal::PeerJoined(self.local_id.clone())).await
    }

    /// Announce that the local participant is leaving the room
    pub async fn send_leave(&self) -> Result<()> {
        self.publish(Signal::PeerLeft(self.local_id.clone())).await
    }
}
