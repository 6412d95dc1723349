use crate::transport::{
    DataChannelSink, MediaKind, MediaTrack, PeerTransport, PeerTransportFactory, SdpKind,
    TransportEvent, TransportRequest, TransportStats,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use pxstream_core::IceCandidate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::stats::StatsReportType;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`WebRtcTransport`]s on top of the `webrtc` crate.
#[derive(Debug, Default, Clone)]
pub struct WebRtcTransportFactory;

#[async_trait]
impl PeerTransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        request: TransportRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        Ok(Box::new(WebRtcTransport::new(request, events).await?))
    }
}

pub struct WebRtcTransport {
    generation: u64,
    send_audio: bool,
    peer_connection: Arc<RTCPeerConnection>,
    events: mpsc::Sender<TransportEvent>,
    transceivers_added: AtomicBool,
}

impl WebRtcTransport {
    pub async fn new(request: TransportRequest, events: mpsc::Sender<TransportEvent>) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: request
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ice_transport_policy: if request.relay_only {
                RTCIceTransportPolicy::Relay
            } else {
                RTCIceTransportPolicy::All
            },
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let generation = request.generation;

        let state_tx = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer connection {} state: {}", generation, s);
                    let event = match s {
                        RTCPeerConnectionState::Connected => TransportEvent::PeerConnected { generation },
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => TransportEvent::Disconnected {
                            generation,
                            reason: s.to_string(),
                        },
                        _ => return,
                    };
                    let _ = tx.send(event).await;
                })
            },
        ));

        let ice_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated {
                        generation,
                        candidate,
                    })
                    .await;
            })
        }));

        // channels created by the peer
        let dc_tx = events.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            Box::pin(async move {
                debug!("Peer opened data channel '{}'", dc.label());
                wire_data_channel(generation, dc, tx);
            })
        }));

        let track_tx = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    let track = MediaTrack {
                        kind: match track.kind() {
                            RTPCodecType::Audio => MediaKind::Audio,
                            _ => MediaKind::Video,
                        },
                        id: track.id(),
                        codec: track.codec().capability.mime_type,
                    };
                    info!("Remote {:?} track {} ({})", track.kind, track.id, track.codec);
                    let _ = tx.send(TransportEvent::Track { generation, track }).await;
                })
            },
        ));

        Ok(Self {
            generation,
            send_audio: request.send_audio,
            peer_connection,
            events,
            transceivers_added: AtomicBool::new(false),
        })
    }

    /// Offers need explicit media sections; answers take them from the remote offer.
    async fn ensure_transceivers(&self) -> Result<()> {
        if self.transceivers_added.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let audio_direction = if self.send_audio {
            RTCRtpTransceiverDirection::Sendrecv
        } else {
            RTCRtpTransceiverDirection::Recvonly
        };
        for (kind, direction) in [
            (RTPCodecType::Video, RTCRtpTransceiverDirection::Recvonly),
            (RTPCodecType::Audio, audio_direction),
        ] {
            self.peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }
        Ok(())
    }
}

fn wire_data_channel(generation: u64, dc: Arc<RTCDataChannel>, tx: mpsc::Sender<TransportEvent>) {
    let label = dc.label().to_string();

    let dc_on_open = dc.clone();
    let tx_open = tx.clone();
    let label_open = label.clone();
    dc.on_open(Box::new(move || {
        let tx = tx_open.clone();
        let label = label_open.clone();
        let sink: Arc<dyn DataChannelSink> = Arc::new(WebRtcDataChannel {
            channel: dc_on_open.clone(),
        });
        Box::pin(async move {
            info!("Data channel '{}' open", label);
            let _ = tx
                .send(TransportEvent::ChannelOpen {
                    generation,
                    label,
                    sink,
                })
                .await;
        })
    }));

    let tx_msg = tx.clone();
    let label_msg = label.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = tx_msg.clone();
        let label = label_msg.clone();
        Box::pin(async move {
            let _ = tx
                .send(TransportEvent::Message {
                    generation,
                    label,
                    data: msg.data,
                })
                .await;
        })
    }));

    dc.on_close(Box::new(move || {
        let tx = tx.clone();
        let label = label.clone();
        Box::pin(async move {
            debug!("Data channel '{}' closed", label);
            let _ = tx
                .send(TransportEvent::ChannelClosed { generation, label })
                .await;
        })
    }));
}

fn description(kind: SdpKind, sdp: String) -> Result<RTCSessionDescription> {
    Ok(match kind {
        SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
    })
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<String> {
        self.ensure_transceivers().await?;
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.peer_connection
            .set_local_description(description(kind, sdp)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()> {
        self.peer_connection
            .set_remote_description(description(kind, sdp)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn create_data_channel(&self, label: &str, negotiated_id: Option<u16>) -> Result<()> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            negotiated: negotiated_id,
            ..Default::default()
        };
        let dc = self
            .peer_connection
            .create_data_channel(label, Some(init))
            .await
            .with_context(|| format!("Failed to create data channel '{label}'"))?;
        wire_data_channel(self.generation, dc, self.events.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<TransportStats> {
        let report = self.peer_connection.get_stats().await;
        let mut stats = TransportStats::default();
        for entry in report.reports.values() {
            if let StatsReportType::InboundRTP(inbound) = entry {
                if inbound.kind == "video" {
                    stats.bytes_received += inbound.bytes_received;
                    stats.packets_received += inbound.packets_received;
                }
            }
        }
        Ok(stats)
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Closing peer connection {} failed: {}", self.generation, e);
            return Err(e.into());
        }
        Ok(())
    }
}

struct WebRtcDataChannel {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannelSink for WebRtcDataChannel {
    fn label(&self) -> &str {
        self.channel.label()
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.channel.send(&data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await?;
        Ok(())
    }
}
