//! Room sessions: wiring and the serialized event loop
//!
//! A [`RoomSession`] owns one negotiation for one room-participant pair. All
//! inputs — inbound signaling, peer-transport callbacks, production
//! completions, and caller commands — converge on a single spawned task that
//! is the only entry point into the state machine, so no two events are ever
//! applied concurrently.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RoomConfig;
use crate::media::capture::{LocalTracks, MediaCapture, TrackKind};
use crate::negotiation::lifecycle::{ConnectionLifecycleMonitor, LifecycleEvent};
use crate::negotiation::machine::{MachineEvent, NegotiationStateMachine};
use crate::negotiation::role::{Role, RoleResolver};
use crate::peer::rtc::RtcPeer;
use crate::peer::transport::{PeerConnectionState, PeerEvent, PeerTransport};
use crate::signaling::bridge::{InboundSignal, SignalingBridge, SignalingTransport};
use crate::signaling::protocol::{ParticipantId, RoomId, Signal, SignalEnvelope};
use crate::signaling::websocket::WebSocketSignaling;
use crate::{Error, Result};

/// Room-level event surfaced to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Direct transport established
    Connected,
    /// Connectivity lost; the session stays up and may recover
    Disconnected,
    /// The remote participant left the room
    PeerLeft(ParticipantId),
    /// The transport failed terminally; the session has been torn down
    Failed(String),
    /// Non-fatal negotiation warning
    Warning(String),
    /// The session is closed and its resources released
    Closed,
}

enum RoomCommand {
    SetTrackEnabled(TrackKind, bool),
    Leave,
}

/// Handle to one joined room
///
/// Dropping the handle tears the session down the same way
/// [`RoomSession::leave`] does.
pub struct RoomSession {
    room_id: RoomId,
    participant_id: ParticipantId,
    commands: mpsc::UnboundedSender<RoomCommand>,
    driver: JoinHandle<()>,
}

impl RoomSession {
    /// Join a room with production collaborators built from the configuration
    ///
    /// Connects the WebSocket signaling client, creates the peer connection,
    /// and attaches local tracks so the produced offer carries them.
    pub async fn connect(config: RoomConfig) -> Result<(Self, mpsc::UnboundedReceiver<RoomEvent>)> {
        config.validate()?;
        let participant_id = config.resolve_participant_id();

        let (peer_events_tx, peer_events_rx) = mpsc::unbounded_channel();
        let peer = RtcPeer::new(&config, peer_events_tx).await?;
        let tracks = Arc::new(LocalTracks::new(config.enable_audio, config.enable_video));
        tracks.attach(peer.connection()).await?;
        let signaling = Arc::new(WebSocketSignaling::connect(&config.signaling_url).await?);

        Self::join(
            config.room_id.clone(),
            participant_id,
            signaling,
            Arc::new(peer),
            peer_events_rx,
            tracks,
        )
        .await
    }

    /// Join a room with injected collaborators
    ///
    /// The session takes exclusive ownership of the peer capability and its
    /// event stream; no other component may drive them afterwards.
    pub async fn join(
        room_id: RoomId,
        participant_id: ParticipantId,
        signaling: Arc<dyn SignalingTransport>,
        peer: Arc<dyn PeerTransport>,
        peer_events: mpsc::UnboundedReceiver<PeerEvent>,
        media: Arc<dyn MediaCapture>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoomEvent>)> {
        let signaling_rx = signaling.subscribe().await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let bridge = SignalingBridge::new(room_id.clone(), participant_id.clone(), signaling);
        let machine = NegotiationStateMachine::new(
            room_id.clone(),
            participant_id.clone(),
            peer,
            outbound_tx,
            completions_tx,
        );
        let monitor = ConnectionLifecycleMonitor::new(Arc::clone(&media));

        let driver = Driver {
            local_id: participant_id.clone(),
            bridge,
            machine,
            monitor,
            resolver: RoleResolver::new(),
            media,
            seen_peers: HashSet::new(),
            outbound_rx,
            completions_rx,
            peer_events,
            signaling_rx,
            commands_rx,
            events_tx,
        };
        let handle = tokio::spawn(driver.run());

        info!(room = %room_id, participant = %participant_id, "joined room");

        Ok((
            Self {
                room_id,
                participant_id,
                commands: commands_tx,
                driver: handle,
            },
            events_rx,
        ))
    }

    /// Room this session belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Local participant id
    pub fn participant_id(&self) -> &ParticipantId {
        &self.participant_id
    }

    /// Enable or disable the local track of the given kind
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<()> {
        self.commands
            .send(RoomCommand::SetTrackEnabled(kind, enabled))
            .map_err(|_| Error::AlreadyClosed)
    }

    /// Leave the room, releasing the transport and announcing the departure
    ///
    /// Idempotent; a session that is already closed absorbs the call.
    pub fn leave(&self) -> Result<()> {
        let _ = self.commands.send(RoomCommand::Leave);
        Ok(())
    }

    /// Wait until the session's event loop has terminated
    pub async fn closed(self) {
        let _ = self.driver.await;
    }
}

/// The single serialized event task behind a [`RoomSession`]
struct Driver {
    local_id: ParticipantId,
    bridge: SignalingBridge,
    machine: NegotiationStateMachine,
    monitor: ConnectionLifecycleMonitor,
    resolver: RoleResolver,
    media: Arc<dyn MediaCapture>,
    seen_peers: HashSet<ParticipantId>,
    outbound_rx: mpsc::UnboundedReceiver<Signal>,
    completions_rx: mpsc::UnboundedReceiver<MachineEvent>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    signaling_rx: mpsc::UnboundedReceiver<SignalEnvelope>,
    commands_rx: mpsc::UnboundedReceiver<RoomCommand>,
    events_tx: mpsc::UnboundedSender<RoomEvent>,
}

impl Driver {
    async fn run(mut self) {
        if let Err(e) = self.bridge.send_join().await {
            warn!(error = %e, "failed to announce join");
        }

        loop {
            tokio::select! {
                biased;
                cmd = self.commands_rx.recv() => match cmd {
                    Some(RoomCommand::SetTrackEnabled(kind, enabled)) => {
                        self.media.set_track_enabled(kind, enabled).await;
                    }
                    // Explicit leave, or the session handle was dropped.
                    Some(RoomCommand::Leave) | None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(MachineEvent::LocalDescriptionReady { kind, result }) = self.completions_rx.recv() => {
                    let outcome = self.machine.on_local_description_ready(kind, result).await;
                    self.absorb(outcome);
                    self.flush_outbound().await;
                }
                Some(event) = self.peer_events.recv() => match event {
                    PeerEvent::CandidateDiscovered(candidate) => {
                        self.machine.on_local_candidate_discovered(candidate);
                        self.flush_outbound().await;
                    }
                    PeerEvent::ConnectionStateChanged(state) => {
                        if self.handle_transport_state(state).await {
                            break;
                        }
                    }
                },
                envelope = self.signaling_rx.recv() => match envelope {
                    Some(envelope) => {
                        if self.handle_signal(envelope).await {
                            break;
                        }
                    }
                    None => {
                        warn!(room = %self.machine.room_id(), "signaling subscription ended");
                        self.shutdown().await;
                        break;
                    }
                },
            }
        }

        debug!(room = %self.machine.room_id(), "room event loop terminated");
    }

    /// Returns true when the session is over and the loop should exit.
    async fn handle_signal(&mut self, envelope: SignalEnvelope) -> bool {
        let Some(signal) = self.bridge.route(envelope) else {
            return false;
        };

        match signal {
            InboundSignal::PeerJoined(peer_id) => {
                if self.seen_peers.insert(peer_id.clone()) {
                    // First sighting: re-announce ourselves so a joiner that
                    // subscribed after our join still learns of us. Safe under
                    // at-least-once delivery; duplicates resolve idempotently.
                    if let Err(e) = self.bridge.send_join().await {
                        warn!(error = %e, "failed to re-announce join");
                    }
                }
                if self.resolver.on_peer_joined(&self.local_id, &peer_id) == Role::Initiator {
                    let outcome = self.machine.start_as_initiator();
                    self.absorb(outcome);
                }
                false
            }
            InboundSignal::Offer { from, description } => {
                let outcome = self.machine.receive_remote_offer(&from, description).await;
                self.absorb(outcome);
                self.flush_outbound().await;
                false
            }
            InboundSignal::Answer(description) => {
                let outcome = self.machine.receive_remote_answer(description).await;
                self.absorb(outcome);
                false
            }
            InboundSignal::Candidate(candidate) => {
                let outcome = self.machine.receive_remote_candidate(candidate).await;
                self.absorb(outcome);
                false
            }
            InboundSignal::PeerLeft(peer_id) => {
                info!(room = %self.machine.room_id(), peer = %peer_id, "remote participant left");
                self.emit(RoomEvent::PeerLeft(peer_id));
                self.shutdown().await;
                true
            }
        }
    }

    /// Returns true when the transport reached a terminal state.
    async fn handle_transport_state(&mut self, state: PeerConnectionState) -> bool {
        match self
            .monitor
            .on_transport_state(&mut self.machine, &self.bridge, state)
            .await
        {
            Some(LifecycleEvent::Connected) => {
                self.emit(RoomEvent::Connected);
                false
            }
            Some(LifecycleEvent::Disconnected) => {
                self.emit(RoomEvent::Disconnected);
                false
            }
            Some(LifecycleEvent::Failed) => {
                self.emit(RoomEvent::Failed("transport failed".to_string()));
                self.emit(RoomEvent::Closed);
                true
            }
            Some(LifecycleEvent::Closed) => {
                self.emit(RoomEvent::Closed);
                true
            }
            None => false,
        }
    }

    async fn shutdown(&mut self) {
        if self
            .monitor
            .teardown(&mut self.machine, &self.bridge)
            .await
        {
            self.emit(RoomEvent::Closed);
        }
    }

    /// Transmit everything the machine emitted while handling the last event.
    async fn flush_outbound(&mut self) {
        while let Ok(signal) = self.outbound_rx.try_recv() {
            if let Err(e) = self.bridge.publish(signal).await {
                warn!(error = %e, "failed to publish signaling message");
            }
        }
    }

    fn absorb(&self, outcome: Result<()>) {
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_absorbed() => {
                debug!(error = %e, "absorbed out-of-order operation");
            }
            Err(e) => {
                warn!(error = %e, "negotiation warning");
                self.emit(RoomEvent::Warning(e.to_string()));
            }
        }
    }

    fn emit(&self, event: RoomEvent) {
        let _ = self.events_tx.send(event);
    }
}
