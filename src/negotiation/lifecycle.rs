//! Connection lifecycle monitoring and teardown
//!
//! Translates transport connection-state changes into room-level lifecycle
//! events and owns the one teardown sequence: close the negotiation, stop
//! captured media, announce the departure. Terminal signals can arrive more
//! than once; teardown runs at most once, debounced by the machine's state.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::media::capture::MediaCapture;
use crate::negotiation::machine::{NegotiationState, NegotiationStateMachine, StateReport};
use crate::peer::transport::PeerConnectionState;
use crate::signaling::bridge::SignalingBridge;

/// Room-level lifecycle event produced from a transport state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Direct transport established
    Connected,
    /// Connectivity lost; tolerated, negotiation stays up
    Disconnected,
    /// Transport failed terminally; teardown has run
    Failed,
    /// Transport closed underneath the negotiation; teardown has run
    Closed,
}

/// Observes transport state and drives required cleanup
pub struct ConnectionLifecycleMonitor {
    media: Arc<dyn MediaCapture>,
}

impl ConnectionLifecycleMonitor {
    /// Create a monitor over the given media collaborator
    pub fn new(media: Arc<dyn MediaCapture>) -> Self {
        Self { media }
    }

    /// Forward a transport connection-state change to the machine and run
    /// teardown if it was terminal
    pub async fn on_transport_state(
        &self,
        machine: &mut NegotiationStateMachine,
        bridge: &SignalingBridge,
        state: PeerConnectionState,
    ) -> Option<LifecycleEvent> {
        match machine.on_underlying_connection_state(state) {
            StateReport::Connected => Some(LifecycleEvent::Connected),
            StateReport::Disconnected => Some(LifecycleEvent::Disconnected),
            StateReport::Failed => {
                self.teardown(machine, bridge).await;
                Some(LifecycleEvent::Failed)
            }
            StateReport::TransportClosed => {
                if self.teardown(machine, bridge).await {
                    Some(LifecycleEvent::Closed)
                } else {
                    None
                }
            }
            StateReport::Ignored => None,
        }
    }

    /// Run the cleanup sequence unless the negotiation is already closed
    ///
    /// Returns whether cleanup was performed. Safe to call from any path
    /// (terminal transport state, explicit leave, remote departure, drop).
    pub async fn teardown(
        &self,
        machine: &mut NegotiationStateMachine,
        bridge: &SignalingBridge,
    ) -> bool {
        if machine.state() == NegotiationState::Closed {
            debug!(room = %machine.room_id(), "teardown skipped: already closed");
            return false;
        }

        // close() flips the machine to Closed first, so a re-entrant terminal
        // signal observes Closed and skips.
        let _ = machine.close().await;
        self.media.stop_all_tracks().await;
        if let Err(e) = bridge.send_leave().await {
            warn!(room = %machine.room_id(), error = %e, "failed to announce departure");
        }
        true
    }
}
