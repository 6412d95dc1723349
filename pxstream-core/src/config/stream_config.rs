use crate::config::{SettingsLookup, keys};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many automatic re-negotiations a failed session may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Counted per `connect()`. Zero disables automatic recovery.
    pub max_renegotiations: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_renegotiations: 1,
        }
    }
}

impl RetryPolicy {
    pub fn allows(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_renegotiations
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamConfig {
    pub signalling_url: String,
    pub auto_connect: bool,
    pub streamer_id: Option<String>,
    /// Codec name as it appears in the SDP rtpmap, e.g. `H264` or `VP9`.
    pub preferred_codec: Option<String>,
    /// Only relay candidates may be used.
    pub force_relay: bool,
    /// The client creates the offer instead of waiting for one.
    pub originate_offer: bool,
    pub use_mic: bool,
    pub request_quality_control: bool,
    pub afk_enabled: bool,
    pub afk_timeout_secs: u64,
    pub afk_grace_secs: u64,
    pub gathering_timeout_ms: u64,
    pub channel_open_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Period of transport statistics sampling once connected. Zero turns
    /// periodic sampling off.
    pub stats_interval_ms: u64,
    pub retry: RetryPolicy,
    pub initial_fps: Option<u8>,
    pub initial_max_bitrate_kbps: Option<u32>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            signalling_url: "ws://127.0.0.1:80".to_string(),
            auto_connect: false,
            streamer_id: None,
            preferred_codec: None,
            force_relay: false,
            originate_offer: false,
            use_mic: false,
            request_quality_control: true,
            afk_enabled: false,
            afk_timeout_secs: 120,
            afk_grace_secs: 10,
            gathering_timeout_ms: 10_000,
            channel_open_timeout_ms: 15_000,
            reconnect_delay_ms: 2_000,
            stats_interval_ms: 1_000,
            retry: RetryPolicy::default(),
            initial_fps: None,
            initial_max_bitrate_kbps: None,
        }
    }
}

impl StreamConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build a config from the external settings store, falling back to
    /// defaults for every key it does not carry.
    pub fn from_lookup(settings: &impl SettingsLookup) -> Self {
        let mut config = Self::default();

        if let Some(url) = settings.text(keys::SIGNALLING_SERVER_URL) {
            config.signalling_url = url;
        }
        if let Some(v) = settings.flag(keys::AUTO_CONNECT) {
            config.auto_connect = v;
        }
        config.streamer_id = settings
            .text(keys::STREAMER_ID)
            .filter(|id| !id.is_empty())
            .or(config.streamer_id);
        config.preferred_codec = settings
            .text(keys::PREFERRED_CODEC)
            .filter(|codec| !codec.is_empty())
            .or(config.preferred_codec);
        if let Some(v) = settings.flag(keys::FORCE_TURN) {
            config.force_relay = v;
        }
        if let Some(v) = settings.flag(keys::BROWSER_SEND_OFFER) {
            config.originate_offer = v;
        }
        if let Some(v) = settings.flag(keys::USE_MIC) {
            config.use_mic = v;
        }
        if let Some(v) = settings.flag(keys::IS_QUALITY_CONTROLLER) {
            config.request_quality_control = v;
        }
        if let Some(v) = settings.flag(keys::AFK_DETECTION) {
            config.afk_enabled = v;
        }
        if let Some(secs) = settings.number(keys::AFK_TIMEOUT_SECS).filter(|s| *s > 0.0) {
            config.afk_timeout_secs = secs as u64;
        }
        if let Some(fps) = settings.number(keys::WEBRTC_FPS).filter(|f| *f > 0.0) {
            config.initial_fps = Some(fps.min(u8::MAX as f64) as u8);
        }
        if let Some(kbps) = settings.number(keys::WEBRTC_MAX_BITRATE).filter(|b| *b > 0.0) {
            config.initial_max_bitrate_kbps = Some(kbps.min(u32::MAX as f64) as u32);
        }

        config
    }

    pub fn afk_timeout(&self) -> Duration {
        Duration::from_secs(self.afk_timeout_secs)
    }

    pub fn afk_grace(&self) -> Duration {
        Duration::from_secs(self.afk_grace_secs)
    }

    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }

    pub fn channel_open_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_open_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }
}
