//! Offer/answer negotiation state machine
//!
//! One machine instance owns the negotiation for one room-participant pair.
//! It is only ever entered from the room's serialized event task: inbound
//! signaling, transport callbacks, and completions of asynchronous
//! description production all arrive through that single queue. Offer and
//! answer production are scheduled on the runtime and re-enter the queue as
//! [`MachineEvent`]s, so a `close()` can overtake an in-flight production and
//! force its result to be discarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::negotiation::buffer::CandidateBuffer;
use crate::peer::transport::{PeerConnectionState, PeerTransport};
use crate::signaling::protocol::{
    IceCandidate, ParticipantId, RoomId, SdpKind, SessionDescription, Signal,
};
use crate::{Error, Result};

/// Negotiation state for one room-participant pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// No exchange started
    Idle,
    /// A local description (offer or answer) is being produced
    AwaitingLocalOffer,
    /// Local offer recorded and emitted, waiting for the answer
    OfferSent,
    /// Remote offer applied, local answer recorded and emitted
    AnswerSent,
    /// Descriptions exchanged on both sides, transport connecting
    Negotiating,
    /// Transport reports an established connection
    Connected,
    /// Transport reports lost connectivity; may recover
    Disconnected,
    /// Transport failed (terminal)
    Failed,
    /// Negotiation closed and resources released
    Closed,
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NegotiationState::Idle => "Idle",
            NegotiationState::AwaitingLocalOffer => "AwaitingLocalOffer",
            NegotiationState::OfferSent => "OfferSent",
            NegotiationState::AnswerSent => "AnswerSent",
            NegotiationState::Negotiating => "Negotiating",
            NegotiationState::Connected => "Connected",
            NegotiationState::Disconnected => "Disconnected",
            NegotiationState::Failed => "Failed",
            NegotiationState::Closed => "Closed",
        };
        write!(f, "{}", name)
    }
}

/// Completion event re-entering the serialized queue
#[derive(Debug)]
pub enum MachineEvent {
    /// An asynchronously produced local description is ready
    LocalDescriptionReady {
        /// What was produced
        kind: SdpKind,
        /// Production outcome
        result: Result<SessionDescription>,
    },
}

/// What a transport connection-state change meant at the room level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateReport {
    /// Connection established
    Connected,
    /// Connectivity lost; tolerated, no teardown
    Disconnected,
    /// Terminal failure; teardown required
    Failed,
    /// The transport closed underneath us; teardown required
    TransportClosed,
    /// No room-level meaning
    Ignored,
}

/// State machine sequencing one offer/answer exchange
pub struct NegotiationStateMachine {
    room_id: RoomId,
    local_id: ParticipantId,
    state: NegotiationState,
    peer: Arc<dyn PeerTransport>,
    buffer: CandidateBuffer,
    remote_description_set: bool,
    /// Kind of local description currently being produced; a completion whose
    /// kind no longer matches is stale (closed or conceded glom) and dropped.
    pending_local: Option<SdpKind>,
    outbound: mpsc::UnboundedSender<Signal>,
    completions: mpsc::UnboundedSender<MachineEvent>,
}

impl NegotiationStateMachine {
    /// Create a machine in `Idle` for one room-participant pair
    ///
    /// `outbound` receives the offers, answers, and candidates this side
    /// emits; `completions` is the re-entry queue for asynchronous
    /// description production.
    pub fn new(
        room_id: RoomId,
        local_id: ParticipantId,
        peer: Arc<dyn PeerTransport>,
        outbound: mpsc::UnboundedSender<Signal>,
        completions: mpsc::UnboundedSender<MachineEvent>,
    ) -> Self {
        Self {
            room_id,
            local_id,
            state: NegotiationState::Idle,
            peer,
            buffer: CandidateBuffer::new(),
            remote_description_set: false,
            pending_local: None,
            outbound,
            completions,
        }
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Room this negotiation belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Number of candidates waiting for the remote description
    pub fn buffered_candidates(&self) -> usize {
        self.buffer.len()
    }

    fn set_state(&mut self, new_state: NegotiationState) {
        if self.state != new_state {
            debug!(
                room = %self.room_id,
                "negotiation state transition: {} -> {}",
                self.state, new_state
            );
            self.state = new_state;
        }
    }

    fn emit(&self, signal: Signal) {
        // Receiver is owned by the room event task for the machine's lifetime.
        let _ = self.outbound.send(signal);
    }

    /// Schedule production of a local description; the completion re-enters
    /// the serialized queue as a [`MachineEvent`].
    fn spawn_local_description(&mut self, kind: SdpKind) {
        self.pending_local = Some(kind);
        let peer = Arc::clone(&self.peer);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = match kind {
                SdpKind::Offer => peer.create_offer().await,
                SdpKind::Answer => peer.create_answer().await,
            };
            let _ = completions.send(MachineEvent::LocalDescriptionReady { kind, result });
        });
    }

    /// Begin the exchange as the offer initiator
    ///
    /// Valid only from `Idle`. Offer production is asynchronous; the offer is
    /// recorded and emitted when its completion is processed.
    pub fn start_as_initiator(&mut self) -> Result<()> {
        match self.state {
            NegotiationState::Closed => return Err(Error::AlreadyClosed),
            NegotiationState::Idle => {}
            other => {
                return Err(Error::InvalidState {
                    operation: "start_as_initiator",
                    state: other.to_string(),
                })
            }
        }

        info!(room = %self.room_id, "starting negotiation as initiator");
        self.set_state(NegotiationState::AwaitingLocalOffer);
        self.spawn_local_description(SdpKind::Offer);
        Ok(())
    }

    /// Process a remote offer
    ///
    /// From `Idle` this applies the offer and schedules the answer. A second
    /// offer while our own is pending or sent is a glommed offer, resolved by
    /// participant-id order. Offers in any later state are duplicates and are
    /// dropped.
    pub async fn receive_remote_offer(
        &mut self,
        from: &ParticipantId,
        desc: SessionDescription,
    ) -> Result<()> {
        match self.state {
            NegotiationState::Closed => Err(Error::AlreadyClosed),
            NegotiationState::Idle => self.accept_remote_offer(desc).await,
            NegotiationState::OfferSent => self.resolve_glommed_offer(from, desc).await,
            NegotiationState::AwaitingLocalOffer
                if self.pending_local == Some(SdpKind::Offer) =>
            {
                self.resolve_glommed_offer(from, desc).await
            }
            other => {
                debug!(room = %self.room_id, state = %other, "dropping duplicate remote offer");
                Ok(())
            }
        }
    }

    async fn accept_remote_offer(&mut self, desc: SessionDescription) -> Result<()> {
        self.peer.set_remote_description(desc).await?;
        self.remote_description_set = true;
        self.set_state(NegotiationState::AwaitingLocalOffer);
        self.flush_buffered_candidates().await;
        self.spawn_local_description(SdpKind::Answer);
        Ok(())
    }

    /// Both sides produced an offer. The lexicographically smaller id stays
    /// initiator; the other side abandons its offer and answers instead. Both
    /// sides evaluate the same order, so they converge.
    async fn resolve_glommed_offer(
        &mut self,
        from: &ParticipantId,
        desc: SessionDescription,
    ) -> Result<()> {
        if self.local_id < *from {
            info!(
                room = %self.room_id,
                remote = %from,
                "glommed offer: keeping local offer, discarding remote"
            );
            return Ok(());
        }

        info!(
            room = %self.room_id,
            remote = %from,
            "glommed offer: conceding initiator role, answering remote offer"
        );
        // accept_remote_offer repoints pending_local at Answer; a stale offer
        // completion then fails the kind check and is discarded.
        self.accept_remote_offer(desc).await
    }

    /// Process a remote answer
    ///
    /// Valid only from `OfferSent`; duplicates and late arrivals are dropped
    /// by the caller on [`Error::UnexpectedAnswer`].
    pub async fn receive_remote_answer(&mut self, desc: SessionDescription) -> Result<()> {
        match self.state {
            NegotiationState::Closed => return Err(Error::AlreadyClosed),
            NegotiationState::OfferSent => {}
            other => return Err(Error::UnexpectedAnswer(other.to_string())),
        }

        self.peer.set_remote_description(desc).await?;
        self.remote_description_set = true;
        self.set_state(NegotiationState::Negotiating);
        self.flush_buffered_candidates().await;
        Ok(())
    }

    /// Process a remote candidate: apply if the remote description is set,
    /// buffer otherwise. Never fails; candidates after close are dropped.
    pub async fn receive_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.state == NegotiationState::Closed {
            debug!(room = %self.room_id, "dropping candidate delivered after close");
            return Ok(());
        }

        // Candidates reach the transport only with a remote description in
        // place and an exchange in progress; anything else waits.
        if self.remote_description_set && self.state != NegotiationState::Idle {
            self.apply_candidate(candidate).await;
        } else {
            self.buffer.push(candidate);
            debug!(
                room = %self.room_id,
                buffered = self.buffer.len(),
                "buffered candidate until remote description is set"
            );
        }
        Ok(())
    }

    /// Forward a locally discovered candidate to signaling
    pub fn on_local_candidate_discovered(&mut self, candidate: IceCandidate) {
        if self.state == NegotiationState::Closed {
            debug!(room = %self.room_id, "dropping local candidate discovered after close");
            return;
        }
        self.emit(Signal::Candidate(candidate));
    }

    /// Map a transport connection state onto the negotiation
    ///
    /// `failed` is terminal; `disconnected` is tolerated and only reported.
    /// The caller is responsible for teardown on [`StateReport::Failed`] and
    /// [`StateReport::TransportClosed`].
    pub fn on_underlying_connection_state(&mut self, new_state: PeerConnectionState) -> StateReport {
        if matches!(
            self.state,
            NegotiationState::Closed | NegotiationState::Failed
        ) {
            return StateReport::Ignored;
        }

        match new_state {
            PeerConnectionState::Connected => {
                self.set_state(NegotiationState::Connected);
                StateReport::Connected
            }
            PeerConnectionState::Disconnected => {
                self.set_state(NegotiationState::Disconnected);
                StateReport::Disconnected
            }
            PeerConnectionState::Failed => {
                self.set_state(NegotiationState::Failed);
                StateReport::Failed
            }
            PeerConnectionState::Closed => StateReport::TransportClosed,
            PeerConnectionState::New | PeerConnectionState::Connecting => StateReport::Ignored,
        }
    }

    /// Process the completion of an asynchronous offer/answer production
    ///
    /// Completions that no longer match the machine's expectation — closed in
    /// the meantime, or the pending kind changed by a conceded glom — are
    /// discarded.
    pub async fn on_local_description_ready(
        &mut self,
        kind: SdpKind,
        result: Result<SessionDescription>,
    ) -> Result<()> {
        if self.state == NegotiationState::Closed {
            debug!(room = %self.room_id, %kind, "discarding local description produced after close");
            return Ok(());
        }
        if self.state != NegotiationState::AwaitingLocalOffer || self.pending_local != Some(kind) {
            debug!(room = %self.room_id, %kind, state = %self.state, "discarding stale local description");
            return Ok(());
        }

        let desc = match result {
            Ok(desc) => desc,
            Err(e) => {
                // Production failed; fall back to Idle and leave retries to
                // the caller.
                self.pending_local = None;
                self.set_state(NegotiationState::Idle);
                return Err(e);
            }
        };

        if let Err(e) = self.peer.set_local_description(desc.clone()).await {
            self.pending_local = None;
            self.set_state(NegotiationState::Idle);
            return Err(e);
        }

        self.pending_local = None;
        match kind {
            SdpKind::Offer => {
                self.emit(Signal::Offer(desc));
                self.set_state(NegotiationState::OfferSent);
            }
            SdpKind::Answer => {
                self.emit(Signal::Answer(desc));
                self.set_state(NegotiationState::AnswerSent);
            }
        }
        Ok(())
    }

    /// Close the negotiation: clear buffered candidates and release the
    /// transport. Idempotent; repeat calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == NegotiationState::Closed {
            return Ok(());
        }

        info!(room = %self.room_id, "closing negotiation");
        self.set_state(NegotiationState::Closed);
        self.pending_local = None;
        self.buffer.clear();
        if let Err(e) = self.peer.close().await {
            warn!(room = %self.room_id, error = %e, "error closing peer transport");
        }
        Ok(())
    }

    async fn flush_buffered_candidates(&mut self) {
        let drained = self.buffer.drain();
        if drained.is_empty() {
            return;
        }
        debug!(
            room = %self.room_id,
            count = drained.len(),
            "applying buffered candidates"
        );
        for candidate in drained {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        // Candidate rejection is non-fatal: logged and ignored.
        if let Err(e) = self.peer.add_candidate(candidate).await {
            warn!(room = %self.room_id, error = %e, "candidate rejected by transport");
        }
    }
}
