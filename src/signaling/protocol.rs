//! Signaling envelope and negotiation payload types
//!
//! Every message relayed through the signaling channel is a [`SignalEnvelope`]:
//! a room id and sender id wrapping one [`Signal`] payload. The sender id is
//! what lets each participant discard its own echoes on a broadcast relay.

use serde::{Deserialize, Serialize};

/// Identifier scoping a signaling session
pub type RoomId = String;

/// Identifier distinguishing the local participant from the remote one
pub type ParticipantId = String;

/// Discriminator for a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Initiator's proposed parameters
    Offer,
    /// Responder's accepted parameters
    Answer,
}

impl std::fmt::Display for SdpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// An opaque negotiation blob produced and consumed by the underlying
/// transport, carried verbatim through signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Whether this is an offer or an answer
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An opaque network-path descriptor
///
/// Field names mirror the browser `RTCIceCandidateInit` dictionary so either
/// end of the relay can be a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description this candidate belongs to
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// Payload of one signaling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Signal {
    /// Session description of kind offer
    Offer(SessionDescription),

    /// Session description of kind answer
    Answer(SessionDescription),

    /// Network-path candidate
    Candidate(IceCandidate),

    /// A participant joined the room
    PeerJoined(ParticipantId),

    /// A participant left the room
    PeerLeft(ParticipantId),
}

impl Signal {
    /// Get the wire name of this payload kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::Candidate(_) => "candidate",
            Signal::PeerJoined(_) => "peer_joined",
            Signal::PeerLeft(_) => "peer_left",
        }
    }
}

/// One relayed signaling message: payload tagged with room and sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Room the message belongs to
    pub room_id: RoomId,

    /// Sender identity, used for self-filtering
    pub from_participant: ParticipantId,

    /// Message payload
    #[serde(flatten)]
    pub signal: Signal,
}

impl SignalEnvelope {
    /// Wrap a payload with room and sender tags
    pub fn new(room_id: RoomId, from_participant: ParticipantId, signal: Signal) -> Self {
        Self {
            room_id,
            from_participant,
            signal,
        }
    }

    /// Convert envelope to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize envelope: {}", e))
        })
    }

    /// Parse envelope from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize envelope: {}", e))
        })
    }
}
