use crate::channel::{DataChannelManager, Dispatched, Dispatcher, MessageHandler};
use crate::error::{NegotiationError, SessionError, SignalingError, TransferError};
use crate::idle::{IdleEvent, IdleMonitor};
use crate::input::{InputEvent, latency_probe, parse_latency_report};
use crate::negotiation::{NegotiationState, NegotiatorConfig, RetryPlan, SessionNegotiator};
use crate::ownership::{Capability, OwnershipArbiter};
use crate::session::command_queue::{CommandQueue, Interrupted, sleep_until_opt};
use crate::session::session_command::SessionCommand;
use crate::session::{MediaSink, SessionEvent, SessionHandle, SessionListener, SessionSnapshot};
use crate::signaling::{SignalingConnector, SignalingEvent, WsSignaling};
use crate::stats::StatsAggregator;
use crate::transfer::{ChunkReassembler, TransferKind};
use crate::transport::{PeerTransportFactory, TransportEvent, WebRtcTransportFactory};
use bytes::Bytes;
use pxstream_core::utils::AFK_DISCONNECT_REASON;
use pxstream_core::{FromPeerMessage, SessionId, SignalMessage, StreamConfig, ToPeerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const EVENT_QUEUE: usize = 256;

async fn deliver(listeners: &[Arc<dyn SessionListener>], handle: &SessionHandle, event: &SessionEvent) {
    for listener in listeners {
        listener.on_event(handle, event).await;
    }
}

/// Owns every component of one streaming session and drives them from a
/// single event loop.
///
/// Create it with [`new`](Self::new), register listeners, then spawn
/// [`run`](Self::run) and talk to it through the returned [`SessionHandle`].
pub struct SessionOrchestrator {
    id: SessionId,
    config: StreamConfig,
    connector: Arc<dyn SignalingConnector>,

    negotiator: SessionNegotiator,
    channels: DataChannelManager,
    dispatcher: Dispatcher,
    reassembler: ChunkReassembler,
    arbiter: OwnershipArbiter,
    idle: IdleMonitor,
    stats: StatsAggregator,

    listeners: Vec<Arc<dyn SessionListener>>,
    media: Option<Arc<dyn MediaSink>>,

    /// Weak so the loop ends once every external handle is dropped.
    command_tx: mpsc::WeakUnboundedSender<SessionCommand>,
    commands: CommandQueue,
    signaling_tx: mpsc::Sender<SignalingEvent>,
    signaling_rx: mpsc::Receiver<SignalingEvent>,
    transport_rx: mpsc::Receiver<TransportEvent>,

    shutdown: CancellationToken,
    /// Cancelled on disconnect; a fresh child of `shutdown` per connect.
    cancel: CancellationToken,

    /// Signalling messages that raced ahead of the `Opened` event.
    early_signals: Vec<SignalMessage>,
    renegotiations: u32,
    retry: Option<(Instant, RetryPlan)>,
    next_stats: Option<Instant>,
    initial_quality_applied: bool,
    latency_sent: Option<Instant>,
    clock_origin: Instant,
    streamer_id: Option<String>,
    last_disconnect_reason: Option<String>,
}

impl SessionOrchestrator {
    pub fn new(
        config: StreamConfig,
        connector: Arc<dyn SignalingConnector>,
        factory: Arc<dyn PeerTransportFactory>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (signaling_tx, signaling_rx) = mpsc::channel(EVENT_QUEUE);
        let (transport_tx, transport_rx) = mpsc::channel(EVENT_QUEUE);

        let negotiator = SessionNegotiator::new(NegotiatorConfig::from(&config), factory, transport_tx);
        let idle = IdleMonitor::new(config.afk_timeout(), config.afk_grace());
        let shutdown = CancellationToken::new();

        let orchestrator = Self {
            id: SessionId::new(),
            streamer_id: config.streamer_id.clone(),
            config,
            connector,
            negotiator,
            channels: DataChannelManager::new(),
            dispatcher: Dispatcher::default(),
            reassembler: ChunkReassembler::new(),
            arbiter: OwnershipArbiter::new(),
            idle,
            stats: StatsAggregator::new(),
            listeners: Vec::new(),
            media: None,
            command_tx: command_tx.downgrade(),
            commands: CommandQueue::new(command_rx),
            signaling_tx,
            signaling_rx,
            transport_rx,
            cancel: shutdown.child_token(),
            shutdown,
            early_signals: Vec::new(),
            renegotiations: 0,
            retry: None,
            next_stats: None,
            initial_quality_applied: false,
            latency_sent: None,
            clock_origin: Instant::now(),
            last_disconnect_reason: None,
        };
        (orchestrator, SessionHandle::new(command_tx))
    }

    /// WebSocket signalling and a webrtc-rs peer connection.
    pub fn with_defaults(config: StreamConfig) -> (Self, SessionHandle) {
        Self::new(config, Arc::new(WsSignaling::new()), Arc::new(WebRtcTransportFactory))
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    pub fn set_media_sink(&mut self, sink: Arc<dyn MediaSink>) {
        self.media = Some(sink);
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: MessageHandler) {
        self.dispatcher.register_handler(name, handler);
    }

    /// Cancelling this token stops the loop after a full disconnect.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Main event loop. Must be spawned; returns after shutdown.
    pub async fn run(mut self) {
        info!("Session loop started");
        if self.config.auto_connect {
            self.connect();
        }

        loop {
            // commands that arrived during a transport step come first
            if let Some(cmd) = self.commands.pop_deferred() {
                if matches!(cmd, SessionCommand::Shutdown) {
                    info!("Shutdown requested");
                    break;
                }
                self.handle_command(cmd).await;
                self.flush_transitions().await;
                continue;
            }

            let deadline = self.next_deadline();

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown token cancelled");
                    break;
                }

                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown) => {
                            info!("Shutdown requested");
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("All session handles dropped. Shutting down session.");
                            break;
                        }
                    }
                }

                evt = self.signaling_rx.recv() => {
                    if let Some(e) = evt {
                        self.handle_signaling_event(e).await;
                    }
                }

                evt = self.transport_rx.recv() => {
                    if let Some(e) = evt {
                        self.handle_transport_event(e).await;
                    }
                }

                _ = sleep_until_opt(deadline) => self.on_timer().await,
            }

            self.flush_transitions().await;
        }

        self.disconnect("shutdown").await;
        self.shutdown.cancel();
        info!("Session loop finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        trace!("Session command {:?}", cmd);
        match cmd {
            SessionCommand::Connect { reply } => {
                let id = self.connect();
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(id));
                }
            }

            SessionCommand::Disconnect { reason, reply } => {
                self.disconnect(&reason).await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }

            SessionCommand::Send { event, reply } => {
                let result = self.send_event(event).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Queued send failed: {}", e);
                        }
                    }
                }
            }

            SessionCommand::Subscribe { streamer_id } => self.subscribe(streamer_id).await,

            SessionCommand::RequestQualityControl => {
                if let Err(e) = self.send_message(ToPeerMessage::RequestQualityControl).await {
                    warn!("Quality control request not sent: {}", e);
                }
            }

            SessionCommand::Release { capability } => {
                if let Some(change) = self.arbiter.release(capability) {
                    info!("Released {} control", capability);
                    self.emit(SessionEvent::OwnershipChanged(change)).await;
                }
            }

            SessionCommand::LatencyTest => self.start_latency_test().await,

            SessionCommand::CollectStats => self.collect_stats().await,

            SessionCommand::SetIdleDetection { enabled } => self.set_idle_detection(enabled),

            SessionCommand::Activity => self.on_activity().await,

            SessionCommand::RegisterHandler { name, handler } => {
                if self.dispatcher.register_handler(name.clone(), handler).is_some() {
                    debug!("Replaced handler for '{}'", name);
                }
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            SessionCommand::Diagnostics { reply } => {
                let _ = reply.send(self.dispatcher.diagnostics());
            }

            // handled by the loop
            SessionCommand::Shutdown => {}
        }
    }

    /// Idempotent while a session is live.
    fn connect(&mut self) -> SessionId {
        if self.negotiator.state().is_live() || self.retry.is_some() {
            debug!("Session {} already live", self.id);
            return self.id;
        }

        self.id = SessionId::new();
        self.renegotiations = 0;
        self.initial_quality_applied = false;
        self.last_disconnect_reason = None;
        info!("Starting session {}", self.id);
        self.open_signaling();
        self.id
    }

    fn open_signaling(&mut self) {
        self.cancel = self.shutdown.child_token();
        self.early_signals.clear();
        let generation = self.negotiator.begin(self.cancel.clone());

        let connector = self.connector.clone();
        let url = self.config.signalling_url.clone();
        let events = self.signaling_tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let event = match connector.connect(&url, generation, events.clone(), cancel).await {
                Ok(output) => SignalingEvent::Opened { generation, output },
                Err(error) => SignalingEvent::ConnectFailed { generation, error },
            };
            let _ = events.send(event).await;
        });
    }

    /// Teardown order: negotiator, channels, partial transfers, ownership
    /// tokens, idle timers.
    async fn disconnect(&mut self, reason: &str) {
        let retry_pending = self.retry.take().is_some();
        let state = self.negotiator.state();
        if !state.is_live() && !retry_pending {
            debug!("Disconnect ({}) with no live session", reason);
            return;
        }

        info!("Disconnecting session {}: {}", self.id, reason);
        self.cancel.cancel();
        if state.is_live() {
            self.negotiator.close().await;
        }
        self.channels.close_all().await;
        self.reassembler.clear();
        self.release_tokens().await;
        self.idle.disable();
        self.next_stats = None;

        self.latency_sent = None;
        self.early_signals.clear();
        self.last_disconnect_reason = Some(reason.to_string());
        self.emit(SessionEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await;
    }

    async fn release_tokens(&mut self) {
        for capability in [Capability::Quality, Capability::Input] {
            if let Some(change) = self.arbiter.release(capability) {
                self.emit(SessionEvent::OwnershipChanged(change)).await;
            }
        }
        self.arbiter.reset();
    }

    /// Failure of the current attempt. Retries per the configured policy,
    /// otherwise closes the session.
    async fn fail(&mut self, err: NegotiationError) {
        if !self.negotiator.state().is_live() {
            debug!("Ignoring failure outside a live session: {}", err);
            return;
        }

        self.negotiator.fail(&err);
        self.emit(SessionEvent::Error(err.clone().into())).await;

        self.channels.close_all().await;
        self.reassembler.clear();
        self.release_tokens().await;
        self.idle.disable();
        self.next_stats = None;
        self.latency_sent = None;

        let retryable = !matches!(err, NegotiationError::RelayUnavailable | NegotiationError::Cancelled);
        if retryable && self.config.retry.allows(self.renegotiations) {
            self.renegotiations += 1;
            let plan = self.negotiator.prepare_retry().await;
            let at = match plan {
                RetryPlan::ReuseSignaling => Instant::now(),
                RetryPlan::Reconnect => Instant::now() + self.config.reconnect_delay(),
            };
            info!(
                "Session {} retry {}/{} ({:?})",
                self.id, self.renegotiations, self.config.retry.max_renegotiations, plan
            );
            self.retry = Some((at, plan));
            return;
        }

        let reason = err.to_string();
        self.cancel.cancel();
        self.negotiator.close().await;
        self.last_disconnect_reason = Some(reason.clone());
        self.emit(SessionEvent::Disconnected { reason }).await;
    }

    async fn run_retry(&mut self, plan: RetryPlan) {
        match plan {
            RetryPlan::Reconnect => {
                info!("Reconnecting signalling for session {}", self.id);
                self.open_signaling();
            }
            RetryPlan::ReuseSignaling => {
                info!("Renegotiating session {} over open signalling", self.id);
                self.channels.expect_direct();
                if self.negotiator.begin_renegotiation() {
                    let deadline = self.negotiator.next_deadline();
                    match self.commands.race(self.negotiator.start_attempt(), deadline).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            self.fail(err).await;
                            return;
                        }
                        Err(interrupted) => {
                            step_interrupted(interrupted);
                            return;
                        }
                    }
                }
                // the streamer only sends a fresh offer to a new subscription
                if !self.config.originate_offer {
                    if let Some(id) = self.streamer_id.clone() {
                        self.subscribe(id).await;
                    }
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.negotiator.next_deadline(),
            self.idle.next_deadline(),
            self.retry.map(|(at, _)| at),
            self.next_stats,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();

        if let Some(err) = self.negotiator.check_deadline(now) {
            self.fail(err).await;
        }

        match self.idle.poll(now) {
            Some(IdleEvent::CountdownStarted { grace }) => {
                self.emit(SessionEvent::IdleCountdown { grace }).await;
            }
            Some(IdleEvent::TimedOut) => {
                warn!("Session {} idle for too long", self.id);
                self.emit(SessionEvent::IdleTimeout).await;
                self.disconnect(AFK_DISCONNECT_REASON).await;
            }
            Some(IdleEvent::Resumed) | None => {}
        }

        if let Some((at, plan)) = self.retry {
            if at <= now {
                self.retry = None;
                self.run_retry(plan).await;
            }
        }

        if let Some(at) = self.next_stats {
            if at <= now {
                self.next_stats = self.config.stats_interval().map(|interval| now + interval);
                self.collect_stats().await;
            }
        }
    }

    async fn handle_signaling_event(&mut self, event: SignalingEvent) {
        let current = event.generation() == self.negotiator.signaling_generation()
            && self.negotiator.state().is_live();
        if !current {
            debug!("Ignoring stale signalling event {:?}", event);
            if let SignalingEvent::Opened { output, .. } = event {
                output.close().await;
            }
            return;
        }

        match event {
            SignalingEvent::Opened { output, .. } => {
                self.negotiator.on_signaling_open(output);
                self.send_signal(SignalMessage::ListStreamers).await;
                for message in std::mem::take(&mut self.early_signals) {
                    self.handle_signal(message).await;
                }
            }

            SignalingEvent::ConnectFailed { error, .. } => self.fail(error.into()).await,

            SignalingEvent::Message { message, .. } => {
                if self.negotiator.signaling_open() {
                    self.handle_signal(message).await;
                } else {
                    self.early_signals.push(message);
                }
            }

            SignalingEvent::Malformed { error, .. } => {
                warn!("Dropping signalling frame: {}", error);
                self.emit(SessionEvent::Error(error.into())).await;
            }

            SignalingEvent::Closed { reason, .. } => {
                self.negotiator.on_signaling_closed();
                match self.negotiator.state() {
                    NegotiationState::Disconnecting | NegotiationState::Closed => {}
                    _ => self.fail(SignalingError::TransportLost(reason).into()).await,
                }
            }
        }
    }

    /// Negotiation steps run raced against commands and the negotiation
    /// deadline, so a stuck transport never blocks disconnect.
    async fn handle_signal(&mut self, message: SignalMessage) {
        debug!("<- signalling {}", message.kind());
        let deadline = self.negotiator.next_deadline();
        let outcome = match message {
            SignalMessage::PeerConfig { config } => {
                if !self.negotiator.has_transport() && self.negotiator.relay().is_none() {
                    self.channels.expect_direct();
                }
                match self.negotiator.accept_peer_config(config) {
                    Ok(true) => {
                        let deadline = self.negotiator.next_deadline();
                        self.commands.race(self.negotiator.start_attempt(), deadline).await
                    }
                    Ok(false) => Ok(Ok(())),
                    Err(err) => Ok(Err(err)),
                }
            }
            SignalMessage::Offer { sdp } => {
                self.commands.race(self.negotiator.on_remote_offer(sdp), deadline).await
            }
            SignalMessage::Answer { sdp } => {
                self.commands.race(self.negotiator.on_remote_answer(sdp), deadline).await
            }
            SignalMessage::IceCandidate { candidate } => self
                .commands
                .race(self.negotiator.on_remote_candidate(candidate), deadline)
                .await
                .map(Ok),
            SignalMessage::PeerDataChannels { send_id, recv_id } => {
                self.channels.expect_relay();
                self.commands
                    .race(self.negotiator.on_peer_data_channels(send_id, recv_id), deadline)
                    .await
            }
            SignalMessage::StreamerList { ids } => {
                self.on_streamer_list(ids).await;
                Ok(Ok(()))
            }
            SignalMessage::PlayerCount { count } => {
                self.emit(SessionEvent::PlayerCount { count }).await;
                Ok(Ok(()))
            }
            SignalMessage::Disconnect { reason } => {
                info!("Signalling server ended the session: {}", reason);
                self.disconnect(&reason).await;
                Ok(Ok(()))
            }
            other => {
                debug!("Ignoring client-bound copy of '{}'", other.kind());
                Ok(Ok(()))
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.fail(err).await,
            Err(interrupted) => step_interrupted(interrupted),
        }
    }

    async fn on_streamer_list(&mut self, ids: Vec<String>) {
        let selected = match &self.streamer_id {
            Some(wanted) if ids.contains(wanted) => Some(wanted.clone()),
            _ if ids.len() == 1 => ids.first().cloned(),
            _ => None,
        };
        if selected.is_none() {
            info!("{} streamer(s) available, waiting for a selection", ids.len());
        }

        self.emit(SessionEvent::StreamerListReceived {
            ids,
            auto_selected: selected.clone(),
        })
        .await;
        if let Some(id) = selected {
            self.subscribe(id).await;
        }
    }

    async fn subscribe(&mut self, streamer_id: String) {
        self.streamer_id = Some(streamer_id.clone());
        if !self.negotiator.signaling_open() {
            info!("Streamer {} will be requested once signalling is open", streamer_id);
            return;
        }
        info!("Subscribing to streamer {}", streamer_id);
        self.send_signal(SignalMessage::Subscribe { streamer_id }).await;
    }

    async fn send_signal(&mut self, message: SignalMessage) {
        let kind = message.kind();
        if let Err(e) = self.negotiator.send_signal(message).await {
            warn!("Could not send '{}': {}", kind, e);
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.negotiator.is_current_transport(event.generation()) {
            trace!("Ignoring stale transport event {:?}", event);
            return;
        }

        match event {
            TransportEvent::ChannelOpen { label, sink, .. } => {
                if !self.channels.on_open(&label, sink) || !self.channels.all_open() {
                    return;
                }
                let relay = self.channels.is_relay();
                if relay {
                    self.send_signal(SignalMessage::PeerDataChannelsReady).await;
                }
                if let Some(media) = &self.media {
                    media.on_channel_ready(relay).await;
                }
                if self.negotiator.on_channels_open() {
                    self.on_connected().await;
                }
            }

            TransportEvent::ChannelClosed { label, .. } => {
                self.channels.on_closed(&label);
                if self.negotiator.state() == NegotiationState::Connected {
                    self.fail(NegotiationError::Transport(format!("data channel '{label}' closed")))
                        .await;
                }
            }

            TransportEvent::Message { label, data, .. } => {
                if let Some(frame) = self.channels.accept_inbound(&label, data) {
                    self.handle_frame(frame).await;
                }
            }

            TransportEvent::CandidateGenerated { candidate, .. } => {
                self.negotiator.on_local_candidate(candidate).await;
            }

            TransportEvent::PeerConnected { .. } => self.negotiator.on_peer_connected(),

            TransportEvent::Disconnected { reason, .. } => {
                self.fail(NegotiationError::Transport(reason)).await;
            }

            TransportEvent::Track { track, .. } => {
                if let Some(media) = &self.media {
                    media.on_track(track).await;
                }
            }
        }
    }

    async fn on_connected(&mut self) {
        info!("Session {} connected", self.id);
        if self.config.request_quality_control {
            if let Err(e) = self.send_message(ToPeerMessage::RequestQualityControl).await {
                warn!("Quality control request not sent: {}", e);
            }
        }
        if let Err(e) = self.send_message(ToPeerMessage::RequestInitialSettings).await {
            warn!("Initial settings request not sent: {}", e);
        }
        if self.config.afk_enabled {
            self.idle.enable(Instant::now());
        }
        self.stats.reset();
        self.next_stats = self.config.stats_interval().map(|interval| Instant::now() + interval);
    }

    async fn handle_frame(&mut self, frame: Bytes) {
        match self.dispatcher.dispatch(&frame) {
            Ok(Dispatched::Message(message)) => self.route_message(message).await,
            Ok(Dispatched::Handled { name }) => trace!("'{}' consumed by its handler", name),
            Ok(Dispatched::CatalogExtended { .. }) => {}
            // counted and logged by the dispatcher
            Err(_) => {}
        }

        for reply in self.dispatcher.drain_outbox() {
            if let Err(e) = self.send_message(reply).await {
                warn!("Automatic reply not sent: {}", e);
            }
        }
    }

    async fn route_message(&mut self, message: FromPeerMessage) {
        match &message {
            FromPeerMessage::QualityControlOwnership { owned } => {
                self.on_ownership(Capability::Quality, *owned).await;
            }
            FromPeerMessage::InputControlOwnership { owned } => {
                self.on_ownership(Capability::Input, *owned).await;
            }
            FromPeerMessage::FreezeFrame { total_len, chunk } => {
                self.on_transfer_header(TransferKind::FreezeFrame, *total_len, chunk).await;
                return;
            }
            FromPeerMessage::FreezeFrameChunk { chunk } => {
                self.on_transfer_chunk(TransferKind::FreezeFrame, chunk).await;
                return;
            }
            FromPeerMessage::FileContents { total_len, chunk } => {
                self.on_transfer_header(TransferKind::File, *total_len, chunk).await;
                return;
            }
            FromPeerMessage::FileContentsChunk { chunk } => {
                self.on_transfer_chunk(TransferKind::File, chunk).await;
                return;
            }
            FromPeerMessage::UnfreezeFrame => {
                if self.reassembler.discard(TransferKind::FreezeFrame) {
                    debug!("Unfreeze dropped a partial freeze frame");
                }
                self.emit(SessionEvent::FreezeFrameCleared).await;
                return;
            }
            FromPeerMessage::FileExtension { extension } => {
                self.reassembler.set_file_extension(extension.clone());
            }
            FromPeerMessage::FileMimeType { mime_type } => {
                self.reassembler.set_file_mime_type(mime_type.clone());
            }
            FromPeerMessage::LatencyTest { report } => self.on_latency_report(report).await,
            _ => {}
        }
        self.emit(SessionEvent::Message(message)).await;
    }

    async fn on_ownership(&mut self, capability: Capability, owned: bool) {
        let Some(change) = self.arbiter.on_peer_flag(capability, owned) else {
            return;
        };
        let quality_granted = capability == Capability::Quality && self.arbiter.holds(Capability::Quality);

        if let Some(err) = change.denied.clone() {
            self.emit(SessionEvent::Error(err.into())).await;
        }
        self.emit(SessionEvent::OwnershipChanged(change)).await;

        if quality_granted && !self.initial_quality_applied {
            self.initial_quality_applied = true;
            self.apply_initial_quality().await;
        }
    }

    async fn apply_initial_quality(&mut self) {
        let mut requests = Vec::new();
        if let Some(fps) = self.config.initial_fps {
            requests.push(ToPeerMessage::FpsRequest { fps });
        }
        if let Some(kbps) = self.config.initial_max_bitrate_kbps {
            requests.push(ToPeerMessage::BitrateRequest {
                max_bitrate_kbps: kbps,
            });
        }
        for request in requests {
            if let Err(e) = self.send_message(request).await {
                warn!("Initial quality setting not sent: {}", e);
            }
        }
    }

    /// Only a header starts a transfer. The most recent header wins; an
    /// unfinished transfer it replaces is dropped, never merged.
    async fn on_transfer_header(&mut self, kind: TransferKind, total_len: u32, first: &[u8]) {
        match self.reassembler.begin(kind, total_len as usize) {
            Some(TransferError::Superseded { .. }) => {
                self.dispatcher.diagnostics_mut().superseded_transfers += 1;
            }
            Some(err) => {
                debug!("Dropping {} header: {}", kind, err);
                self.dispatcher.diagnostics_mut().malformed += 1;
                return;
            }
            None => {}
        }
        if !first.is_empty() {
            self.on_transfer_chunk(kind, first).await;
        }
    }

    async fn on_transfer_chunk(&mut self, kind: TransferKind, chunk: &[u8]) {
        match self.reassembler.append(kind, chunk) {
            Ok(Some(done)) => {
                if done.overrun > 0 {
                    self.dispatcher.diagnostics_mut().transfer_overruns += 1;
                }
                info!("{} transfer complete ({} bytes)", kind, done.data.len());
                self.emit(SessionEvent::TransferComplete(done)).await;
            }
            Ok(None) => trace!(
                "{} transfer at {}/{} bytes",
                kind,
                self.reassembler.received(kind),
                self.reassembler.declared(kind).unwrap_or_default()
            ),
            Err(err) => {
                debug!("Dropping chunk: {}", err);
                self.dispatcher.diagnostics_mut().orphan_chunks += 1;
            }
        }
    }

    async fn collect_stats(&mut self) {
        if self.negotiator.state() != NegotiationState::Connected {
            debug!("No connected transport to sample");
            return;
        }
        let deadline = self.negotiator.next_deadline();
        let sample = match self.commands.race(self.negotiator.transport_stats(), deadline).await {
            Ok(Some(Ok(sample))) => sample,
            Ok(Some(Err(e))) => {
                warn!("Transport statistics unavailable: {}", e);
                return;
            }
            Ok(None) => return,
            Err(interrupted) => {
                step_interrupted(interrupted);
                return;
            }
        };

        let stats = self.stats.update(Instant::now(), sample);
        trace!("Inbound video at {:?} kbps", stats.bitrate_kbps);
        self.emit(SessionEvent::Stats(stats)).await;
    }

    async fn start_latency_test(&mut self) {
        let now = Instant::now();
        let start_ms = u64::try_from(now.duration_since(self.clock_origin).as_millis()).unwrap_or(u64::MAX);
        let sent = match latency_probe(start_ms) {
            Ok(probe) => self.send_message(probe).await,
            Err(e) => Err(e.into()),
        };
        match sent {
            Ok(()) => self.latency_sent = Some(now),
            Err(e) => warn!("Latency probe not sent: {}", e),
        }
    }

    async fn on_latency_report(&mut self, report: &str) {
        let Some(sent) = self.latency_sent.take() else {
            warn!("Latency report with no probe outstanding");
            return;
        };
        match parse_latency_report(report, sent.elapsed()) {
            Ok(result) => {
                info!("Latency round trip {:?}", result.round_trip);
                self.emit(SessionEvent::LatencyProbe(result)).await;
            }
            Err(e) => {
                warn!("{}", e);
                self.dispatcher.diagnostics_mut().malformed += 1;
            }
        }
    }

    fn set_idle_detection(&mut self, enabled: bool) {
        self.config.afk_enabled = enabled;
        if !enabled {
            info!("Idle detection disabled");
            self.idle.disable();
            return;
        }
        if self.negotiator.state() == NegotiationState::Connected && !self.idle.is_enabled() {
            info!("Idle detection enabled");
            self.idle.enable(Instant::now());
        }
    }

    async fn on_activity(&mut self) {
        if let Some(IdleEvent::Resumed) = self.idle.activity(Instant::now()) {
            self.emit(SessionEvent::IdleResumed).await;
        }
    }

    async fn send_event(&mut self, event: InputEvent) -> Result<(), SessionError> {
        if event.is_activity() {
            self.on_activity().await;
        }
        if event.affects_quality() {
            self.gate(Capability::Quality)?;
        }
        let message = event.into_message()?;
        self.send_message(message).await
    }

    fn gate(&mut self, capability: Capability) -> Result<(), SessionError> {
        self.arbiter.gate(capability).map_err(|e| {
            debug!("Send blocked: {}", e);
            self.dispatcher.diagnostics_mut().rejected_sends += 1;
            e.into()
        })
    }

    async fn send_message(&mut self, message: ToPeerMessage) -> Result<(), SessionError> {
        if message.is_input() {
            self.gate(Capability::Input)?;
        }
        if message.affects_quality() {
            self.gate(Capability::Quality)?;
        }
        let requests_quality = message == ToPeerMessage::RequestQualityControl;
        if requests_quality && self.arbiter.holds(Capability::Quality) {
            debug!("Quality control already held");
            return Ok(());
        }

        let frame = self.dispatcher.encode(&message)?;
        if let Err(e) = self.channels.send(frame).await {
            self.dispatcher.diagnostics_mut().rejected_sends += 1;
            return Err(e.into());
        }
        trace!("-> {}", message.name());

        if requests_quality {
            self.arbiter.request(Capability::Quality);
        }
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.negotiator.state(),
            relay: self.channels.is_relay(),
            quality_control: self.arbiter.state(Capability::Quality),
            input_control: self.arbiter.state(Capability::Input),
            preferred_codec: self.config.preferred_codec.clone(),
            streamer_id: self.streamer_id.clone(),
            last_disconnect_reason: self.last_disconnect_reason.clone(),
        }
    }

    async fn flush_transitions(&mut self) {
        let transitions = self.negotiator.take_transitions();
        if transitions.is_empty() {
            return;
        }
        let Some(handle) = self.handle() else {
            return;
        };
        let listeners = self.listeners.clone();
        for (from, to) in transitions {
            deliver(&listeners, &handle, &SessionEvent::StateChanged { from, to }).await;
        }
    }

    /// Pending state changes go out first so listeners see them in order.
    async fn emit(&mut self, event: SessionEvent) {
        self.flush_transitions().await;
        if let Some(handle) = self.handle() {
            let listeners = self.listeners.clone();
            deliver(&listeners, &handle, &event).await;
        }
    }

    fn handle(&self) -> Option<SessionHandle> {
        let handle = self.command_tx.upgrade().map(SessionHandle::new);
        if handle.is_none() {
            debug!("No session handles left; events are dropped");
        }
        handle
    }
}

/// The loop picks up from wherever the step was dropped: a queued command,
/// an expired deadline or closed handles.
fn step_interrupted(interrupted: Interrupted) {
    debug!("Transport step abandoned: {:?}", interrupted);
}
