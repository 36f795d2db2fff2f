//! Error types for room negotiation

/// Result type alias using the roomlink Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during room negotiation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation invoked from a state that forbids it
    #[error("Invalid state for {operation}: negotiation is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the negotiation was in
        state: String,
    },

    /// Answer received while no offer was outstanding
    #[error("Unexpected answer in state {0}")]
    UnexpectedAnswer(String),

    /// The underlying transport refused a session description
    #[error("Session description rejected: {0}")]
    DescriptionRejected(String),

    /// The underlying transport refused an ICE candidate
    #[error("ICE candidate rejected: {0}")]
    CandidateRejected(String),

    /// The underlying transport reached its terminal failure state
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// Operation invoked after the negotiation was closed
    #[error("Negotiation already closed")]
    AlreadyClosed,

    /// Peer connection setup or shutdown error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error terminates the negotiation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportFailed(_))
    }

    /// Check if this error should be surfaced as a non-fatal negotiation warning
    pub fn is_negotiation_warning(&self) -> bool {
        matches!(
            self,
            Error::DescriptionRejected(_) | Error::CandidateRejected(_)
        )
    }

    /// Check if this error is absorbed by the state machine (bad ordering,
    /// duplicates, post-close calls) and never escalates
    pub fn is_absorbed(&self) -> bool {
        matches!(
            self,
            Error::InvalidState { .. } | Error::UnexpectedAnswer(_) | Error::AlreadyClosed
        )
    }
}
