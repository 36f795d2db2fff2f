//! Offer-initiator role resolution
//!
//! Exactly one side of a room may initiate the offer/answer exchange. The
//! resolver decides which from the pair of participant ids and remembers the
//! decision, so join notifications redelivered by an at-least-once relay can
//! never flip the role mid-negotiation.

use tracing::debug;

use crate::signaling::protocol::ParticipantId;

/// Role of the local participant in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This side produces the offer
    Initiator,
    /// This side waits for the offer and answers
    Responder,
    /// The join notification was a self-echo; no role implied
    Ignore,
}

/// Decides and remembers which participant initiates for one room
///
/// The participant with the lexicographically smaller id initiates. Both
/// sides evaluate the same total order over the same two ids, so concurrent
/// joins converge without ever producing two offers. The same order is the
/// glommed-offer tie-break, so resolver and tie-break can never disagree.
#[derive(Debug, Default)]
pub struct RoleResolver {
    assigned: Option<Role>,
}

impl RoleResolver {
    /// Create a resolver with no role assigned yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the local role from a join notification
    ///
    /// Self-joins return [`Role::Ignore`] without assigning. The first
    /// decision is recorded; later calls return it unchanged.
    pub fn on_peer_joined(&mut self, own_id: &ParticipantId, joined_id: &ParticipantId) -> Role {
        if joined_id == own_id {
            return Role::Ignore;
        }

        if let Some(role) = self.assigned {
            return role;
        }

        let role = if own_id < joined_id {
            Role::Initiator
        } else {
            Role::Responder
        };

        debug!(own = %own_id, joined = %joined_id, ?role, "role resolved");
        self.assigned = Some(role);
        role
    }

    /// Get the recorded role, if one has been assigned
    pub fn assigned(&self) -> Option<Role> {
        self.assigned
    }
}
