use serde_json::Value;
use std::collections::HashMap;

/// Well-known setting keys read by [`StreamConfig::from_lookup`](crate::StreamConfig::from_lookup).
pub mod keys {
    pub const AUTO_CONNECT: &str = "AutoConnect";
    pub const FORCE_TURN: &str = "ForceTURN";
    pub const BROWSER_SEND_OFFER: &str = "BrowserSendOffer";
    pub const USE_MIC: &str = "UseMic";
    pub const AFK_DETECTION: &str = "AFKDetection";
    pub const AFK_TIMEOUT_SECS: &str = "AFKTimeoutSecs";
    pub const PREFERRED_CODEC: &str = "PreferredCodec";
    pub const STREAMER_ID: &str = "StreamerId";
    pub const IS_QUALITY_CONTROLLER: &str = "IsQualityController";
    pub const SIGNALLING_SERVER_URL: &str = "SignallingServerUrl";
    pub const WEBRTC_FPS: &str = "WebRTCFPS";
    pub const WEBRTC_MAX_BITRATE: &str = "WebRTCMaxBitrate";
}

/// Read-only key/value view over an external settings store.
pub trait SettingsLookup {
    fn flag(&self, key: &str) -> Option<bool>;
    fn number(&self, key: &str) -> Option<f64>;
    fn text(&self, key: &str) -> Option<String>;
}

impl SettingsLookup for HashMap<String, Value> {
    fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|n| n != 0.0),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
