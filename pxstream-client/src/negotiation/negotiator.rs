use crate::error::{NegotiationError, SignalingError};
use crate::negotiation::NegotiationState;
use crate::signaling::SignalingOutput;
use crate::transport::{
    PeerTransport, PeerTransportFactory, SdpKind, TransportEvent, TransportRequest, TransportStats,
};
use pxstream_core::utils::{DIRECT_CHANNEL_LABEL, RELAY_RECV_LABEL, RELAY_SEND_LABEL};
use pxstream_core::{IceCandidate, PeerConfig, SignalMessage, StreamConfig, sdp};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatorConfig {
    pub originate_offer: bool,
    pub force_relay: bool,
    pub preferred_codec: Option<String>,
    pub send_audio: bool,
    pub gathering_timeout: Duration,
    pub channel_open_timeout: Duration,
}

impl From<&StreamConfig> for NegotiatorConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            originate_offer: config.originate_offer,
            force_relay: config.force_relay,
            preferred_codec: config.preferred_codec.clone(),
            send_audio: config.use_mic,
            gathering_timeout: config.gathering_timeout(),
            channel_open_timeout: config.channel_open_timeout(),
        }
    }
}

/// Stream ids of the two negotiated channels used behind a relay, from
/// this client's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayChannels {
    pub send_id: u16,
    pub recv_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    /// From peer config acceptance until ICE connectivity.
    Gathering(Instant),
    ChannelOpen(Instant),
}

impl Deadline {
    fn at(self) -> Instant {
        match self {
            Deadline::Gathering(at) | Deadline::ChannelOpen(at) => at,
        }
    }
}

/// What a failed attempt needs before it can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
    /// Signalling is still open; renegotiate over it.
    ReuseSignaling,
    /// Signalling is gone; connect it again first.
    Reconnect,
}

/// Drives signalling and session establishment and owns the peer transport.
///
/// The negotiator never calls back into the session. State transitions are
/// queued and drained with [`take_transitions`](Self::take_transitions).
///
/// Async steps await the transport. The caller may drop any of them
/// mid-flight (disconnect, deadline); the attempt is then torn down with
/// [`fail`](Self::fail) or [`close`](Self::close), never resumed.
pub struct SessionNegotiator {
    config: NegotiatorConfig,
    factory: Arc<dyn PeerTransportFactory>,
    transport_tx: mpsc::Sender<TransportEvent>,

    state: NegotiationState,
    transitions: Vec<(NegotiationState, NegotiationState)>,

    signaling: Option<Box<dyn SignalingOutput>>,
    signaling_generation: u64,
    transport: Option<Box<dyn PeerTransport>>,
    transport_generation: u64,

    peer_config: Option<PeerConfig>,
    pending_offer: Option<String>,
    pending_candidates: Vec<IceCandidate>,
    local_description: bool,
    remote_description: bool,
    awaiting_answer: bool,
    channels_open: bool,
    relay: Option<RelayChannels>,
    relay_channels_created: bool,
    deadline: Option<Deadline>,
    cancel: CancellationToken,
}

async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = anyhow::Result<T>>,
    map: fn(String) -> NegotiationError,
) -> Result<T, NegotiationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(NegotiationError::Cancelled),
        res = fut => res.map_err(|e| map(format!("{e:#}"))),
    }
}

async fn apply_candidates(
    cancel: &CancellationToken,
    transport: &dyn PeerTransport,
    candidates: Vec<IceCandidate>,
) {
    for candidate in candidates {
        let shown = candidate.candidate.clone();
        if let Err(e) = guarded(cancel, transport.add_ice_candidate(candidate), NegotiationError::Transport).await {
            warn!("Failed to add ICE candidate '{}': {}", shown, e);
        }
    }
}

impl SessionNegotiator {
    pub fn new(
        config: NegotiatorConfig,
        factory: Arc<dyn PeerTransportFactory>,
        transport_tx: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            config,
            factory,
            transport_tx,
            state: NegotiationState::Idle,
            transitions: Vec::new(),
            signaling: None,
            signaling_generation: 0,
            transport: None,
            transport_generation: 0,
            peer_config: None,
            pending_offer: None,
            pending_candidates: Vec::new(),
            local_description: false,
            remote_description: false,
            awaiting_answer: false,
            channels_open: false,
            relay: None,
            relay_channels_created: false,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn take_transitions(&mut self) -> Vec<(NegotiationState, NegotiationState)> {
        std::mem::take(&mut self.transitions)
    }

    fn advance(&mut self, next: NegotiationState) -> bool {
        if !self.state.can_advance_to(next) {
            debug!("Ignoring negotiation transition {} -> {}", self.state, next);
            return false;
        }
        info!("Negotiation {} -> {}", self.state, next);
        self.transitions.push((self.state, next));
        self.state = next;
        true
    }

    /// Start a new attempt from scratch. Returns the generation the new
    /// signalling connection must tag its events with.
    pub fn begin(&mut self, cancel: CancellationToken) -> u64 {
        if self.state.is_terminal() || self.state == NegotiationState::Idle {
            self.reset_to(NegotiationState::Idle);
        }
        self.cancel = cancel;
        self.signaling_generation += 1;
        self.advance(NegotiationState::SignalingConnecting);
        self.signaling_generation
    }

    fn reset_to(&mut self, state: NegotiationState) {
        if self.state != state {
            info!("Negotiation reset {} -> {}", self.state, state);
            self.transitions.push((self.state, state));
            self.state = state;
        }
    }

    pub fn signaling_generation(&self) -> u64 {
        self.signaling_generation
    }

    pub fn transport_generation(&self) -> u64 {
        self.transport_generation
    }

    pub fn is_current_transport(&self, generation: u64) -> bool {
        self.transport.is_some() && generation == self.transport_generation
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn signaling_open(&self) -> bool {
        self.signaling.is_some()
    }

    pub fn relay(&self) -> Option<RelayChannels> {
        self.relay
    }

    pub fn on_signaling_open(&mut self, output: Box<dyn SignalingOutput>) {
        self.signaling = Some(output);
        self.advance(NegotiationState::SignalingOpen);
    }

    pub fn on_signaling_closed(&mut self) {
        self.signaling = None;
    }

    fn output(&self) -> Result<&dyn SignalingOutput, SignalingError> {
        self.signaling.as_deref().ok_or(SignalingError::NotOpen)
    }

    pub async fn send_signal(&self, message: SignalMessage) -> Result<(), SignalingError> {
        self.output()?.send_signal(message).await
    }

    /// Relay check, then arm a new attempt. Returns true when the caller
    /// must drive [`start_attempt`](Self::start_attempt).
    pub fn accept_peer_config(&mut self, config: PeerConfig) -> Result<bool, NegotiationError> {
        if self.config.force_relay && !config.has_relay_server() {
            error!("Relay required but peer config lists no TURN server");
            return Err(NegotiationError::RelayUnavailable);
        }

        let had_transport = self.transport.is_some();
        self.peer_config = Some(config);
        if had_transport {
            debug!("Peer config refreshed; keeping current transport");
            return Ok(false);
        }
        self.arm_attempt();
        Ok(true)
    }

    /// Gathering starts with the attempt, and so does its deadline.
    fn arm_attempt(&mut self) {
        self.advance(NegotiationState::DescriptionExchanging);
        self.deadline = Some(Deadline::Gathering(Instant::now() + self.config.gathering_timeout));
    }

    /// Create the transport, then send the offer or answer the held one.
    pub async fn start_attempt(&mut self) -> Result<(), NegotiationError> {
        let Some(peer_config) = self.peer_config.clone() else {
            return Ok(());
        };
        self.start_transport(&peer_config).await?;

        if self.config.originate_offer {
            self.send_local_offer().await?;
        } else if let Some(sdp) = self.pending_offer.take() {
            self.on_remote_offer(sdp).await?;
        }
        Ok(())
    }

    async fn start_transport(&mut self, peer_config: &PeerConfig) -> Result<(), NegotiationError> {
        self.transport_generation += 1;
        let relay_only = self.config.force_relay
            || peer_config.options.ice_transport_policy.as_deref() == Some("relay");
        let request = TransportRequest {
            generation: self.transport_generation,
            ice_servers: peer_config.relay_servers.clone(),
            relay_only,
            send_audio: self.config.send_audio,
        };

        info!(
            "Creating peer transport {} ({} ICE server entries, relay_only={})",
            request.generation,
            request.ice_servers.len(),
            relay_only
        );
        let transport = guarded(
            &self.cancel,
            self.factory.create(request, self.transport_tx.clone()),
            NegotiationError::Transport,
        )
        .await?;
        self.transport = Some(transport);

        if self.relay.is_some() {
            self.create_relay_channels().await?;
        }
        Ok(())
    }

    fn munge(&self, sdp: String) -> String {
        match &self.config.preferred_codec {
            Some(codec) => sdp::prefer_codec(&sdp, codec),
            None => sdp,
        }
    }

    async fn send_local_offer(&mut self) -> Result<(), NegotiationError> {
        let Some(transport) = self.transport.as_deref() else {
            return Err(NegotiationError::Transport("no peer transport".into()));
        };

        if self.relay.is_none() {
            guarded(
                &self.cancel,
                transport.create_data_channel(DIRECT_CHANNEL_LABEL, None),
                NegotiationError::Transport,
            )
            .await?;
        }
        let offer = guarded(&self.cancel, transport.create_offer(), NegotiationError::DescriptionRejected).await?;
        let offer = self.munge(offer);
        guarded(
            &self.cancel,
            transport.set_local_description(SdpKind::Offer, offer.clone()),
            NegotiationError::DescriptionRejected,
        )
        .await?;

        info!("Sending offer");
        self.output()?.send_offer(offer).await?;
        self.local_description = true;
        self.awaiting_answer = true;
        Ok(())
    }

    pub async fn on_remote_offer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        let Some(transport) = self.transport.as_deref() else {
            debug!("Offer arrived before peer config; holding it");
            self.pending_offer = Some(sdp);
            return Ok(());
        };

        info!("Applying remote offer");
        guarded(
            &self.cancel,
            transport.set_remote_description(SdpKind::Offer, sdp),
            NegotiationError::DescriptionRejected,
        )
        .await?;
        let pending = std::mem::take(&mut self.pending_candidates);
        apply_candidates(&self.cancel, transport, pending).await;

        let answer = guarded(&self.cancel, transport.create_answer(), NegotiationError::DescriptionRejected).await?;
        let answer = self.munge(answer);
        guarded(
            &self.cancel,
            transport.set_local_description(SdpKind::Answer, answer.clone()),
            NegotiationError::DescriptionRejected,
        )
        .await?;

        info!("Sending answer");
        self.output()?.send_answer(answer).await?;
        self.remote_description = true;
        self.local_description = true;
        self.description_complete();
        Ok(())
    }

    pub async fn on_remote_answer(&mut self, sdp: String) -> Result<(), NegotiationError> {
        if !self.awaiting_answer {
            warn!("Ignoring answer with no offer outstanding");
            return Ok(());
        }
        let Some(transport) = self.transport.as_deref() else {
            return Err(NegotiationError::Transport("no peer transport".into()));
        };

        info!("Applying remote answer");
        guarded(
            &self.cancel,
            transport.set_remote_description(SdpKind::Answer, sdp),
            NegotiationError::DescriptionRejected,
        )
        .await?;
        let pending = std::mem::take(&mut self.pending_candidates);
        apply_candidates(&self.cancel, transport, pending).await;

        self.awaiting_answer = false;
        self.remote_description = true;
        self.description_complete();
        Ok(())
    }

    /// Remote candidates are applied once the remote description is set;
    /// earlier ones wait in a buffer.
    pub async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        match self.transport.as_deref() {
            Some(transport) if self.remote_description => {
                apply_candidates(&self.cancel, transport, vec![candidate]).await;
            }
            _ => {
                debug!("Buffering early ICE candidate");
                self.pending_candidates.push(candidate);
            }
        }
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub async fn on_local_candidate(&self, candidate: IceCandidate) {
        let sent = match self.output() {
            Ok(output) => output.send_ice(candidate).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Could not trickle local candidate: {}", e);
        }
    }

    /// Switch to relay mode: two negotiated channels instead of the implicit one.
    pub async fn on_peer_data_channels(
        &mut self,
        relay_send_id: u16,
        relay_recv_id: u16,
    ) -> Result<(), NegotiationError> {
        // the relay's send stream is the one we receive on
        let channels = RelayChannels {
            send_id: relay_recv_id,
            recv_id: relay_send_id,
        };
        info!(
            "Relay mode: send on stream {}, receive on stream {}",
            channels.send_id, channels.recv_id
        );
        self.relay = Some(channels);
        self.relay_channels_created = false;
        if self.transport.is_some() {
            self.create_relay_channels().await?;
        }
        Ok(())
    }

    async fn create_relay_channels(&mut self) -> Result<(), NegotiationError> {
        let (Some(channels), Some(transport)) = (self.relay, self.transport.as_deref()) else {
            return Ok(());
        };
        if self.relay_channels_created {
            return Ok(());
        }
        for (label, id) in [
            (RELAY_SEND_LABEL, channels.send_id),
            (RELAY_RECV_LABEL, channels.recv_id),
        ] {
            guarded(
                &self.cancel,
                transport.create_data_channel(label, Some(id)),
                NegotiationError::Transport,
            )
            .await?;
        }
        self.relay_channels_created = true;
        Ok(())
    }

    fn description_complete(&mut self) {
        self.advance(NegotiationState::CandidateGathering);
        self.try_connected();
    }

    /// ICE is up; the channels now have a bounded time to open.
    pub fn on_peer_connected(&mut self) {
        if self.state == NegotiationState::Connected || self.channels_open {
            return;
        }
        self.deadline = Some(Deadline::ChannelOpen(
            Instant::now() + self.config.channel_open_timeout,
        ));
    }

    /// Every required channel endpoint reports open. Returns true if the
    /// session just became connected.
    pub fn on_channels_open(&mut self) -> bool {
        self.channels_open = true;
        self.try_connected()
    }

    fn try_connected(&mut self) -> bool {
        if !(self.local_description && self.remote_description && self.channels_open) {
            return false;
        }
        if self.advance(NegotiationState::Connected) {
            self.deadline = None;
            return true;
        }
        false
    }

    /// Counters of the current transport, if there is one.
    pub async fn transport_stats(&self) -> Option<Result<TransportStats, NegotiationError>> {
        let transport = self.transport.as_deref()?;
        Some(guarded(&self.cancel, transport.stats(), NegotiationError::Transport).await)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline.map(Deadline::at)
    }

    /// Returns the failure if a pending deadline has passed.
    pub fn check_deadline(&mut self, now: Instant) -> Option<NegotiationError> {
        let deadline = self.deadline?;
        if now < deadline.at() {
            return None;
        }
        self.deadline = None;
        Some(match deadline {
            Deadline::Gathering(_) => NegotiationError::GatheringTimeout,
            Deadline::ChannelOpen(_) => NegotiationError::ChannelNeverOpened,
        })
    }

    pub fn fail(&mut self, err: &NegotiationError) {
        error!("Negotiation failed: {}", err);
        self.deadline = None;
        self.advance(NegotiationState::Failed);
    }

    async fn teardown_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Peer transport {} close failed: {:#}", self.transport_generation, e);
            }
        }
        // stale events from the old transport no longer match
        self.transport_generation += 1;
        self.pending_offer = None;
        self.pending_candidates.clear();
        self.local_description = false;
        self.remote_description = false;
        self.awaiting_answer = false;
        self.channels_open = false;
        self.relay = None;
        self.relay_channels_created = false;
        self.deadline = None;
    }

    /// Tear down the failed attempt and report how to start the next one.
    pub async fn prepare_retry(&mut self) -> RetryPlan {
        self.teardown_transport().await;
        if self.signaling.is_some() {
            self.reset_to(NegotiationState::SignalingOpen);
            RetryPlan::ReuseSignaling
        } else {
            self.reset_to(NegotiationState::Idle);
            RetryPlan::Reconnect
        }
    }

    /// Arm a renegotiation over the open signalling connection with the
    /// cached peer config. Returns false without one; the peer has to
    /// resend it. On true the caller drives [`start_attempt`](Self::start_attempt).
    pub fn begin_renegotiation(&mut self) -> bool {
        if self.peer_config.is_none() {
            debug!("No cached peer config; waiting for the peer to send one");
            return false;
        }
        self.arm_attempt();
        true
    }

    /// Full teardown: transport first, then signalling.
    pub async fn close(&mut self) {
        self.advance(NegotiationState::Disconnecting);
        self.teardown_transport().await;
        if let Some(signaling) = self.signaling.take() {
            signaling.close().await;
        }
        self.peer_config = None;
        self.advance(NegotiationState::Closed);
    }
}
