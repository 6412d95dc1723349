use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    /// True when any url of this entry is a TURN relay.
    pub fn is_relay(&self) -> bool {
        self.urls.iter().any(|url| {
            let url = url.trim_start().to_ascii_lowercase();
            url.starts_with("turn:") || url.starts_with("turns:")
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerOptions {
    /// `"relay"` restricts connectivity to relay candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice_transport_policy: Option<String>,
}

/// Connectivity configuration pushed by the signalling server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    #[serde(default)]
    pub relay_servers: Vec<IceServerConfig>,
    #[serde(default)]
    pub options: PeerOptions,
}

impl PeerConfig {
    pub fn has_relay_server(&self) -> bool {
        self.relay_servers.iter().any(IceServerConfig::is_relay)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// One signalling frame, encoded as a JSON object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    PeerConfig {
        #[serde(flatten)]
        config: PeerConfig,
    },
    StreamerList {
        ids: Vec<String>,
    },
    PlayerCount {
        count: u32,
    },
    #[serde(rename_all = "camelCase")]
    PeerDataChannels {
        send_id: u16,
        recv_id: u16,
    },
    Disconnect {
        #[serde(default)]
        reason: String,
    },
    ListStreamers,
    #[serde(rename_all = "camelCase")]
    Subscribe {
        streamer_id: String,
    },
    PeerDataChannelsReady,
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::PeerConfig { .. } => "peer-config",
            SignalMessage::StreamerList { .. } => "streamer-list",
            SignalMessage::PlayerCount { .. } => "player-count",
            SignalMessage::PeerDataChannels { .. } => "peer-data-channels",
            SignalMessage::Disconnect { .. } => "disconnect",
            SignalMessage::ListStreamers => "list-streamers",
            SignalMessage::Subscribe { .. } => "subscribe",
            SignalMessage::PeerDataChannelsReady => "peer-data-channels-ready",
        }
    }
}
