/// Label of the single bidirectional data channel in direct mode.
pub const DIRECT_CHANNEL_LABEL: &str = "cirrus";
pub const RELAY_SEND_LABEL: &str = "send-datachannel";
pub const RELAY_RECV_LABEL: &str = "recv-datachannel";

/// Disconnect reason used when the idle monitor times out.
pub const AFK_DISCONNECT_REASON: &str = "afk";
