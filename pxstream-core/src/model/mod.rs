mod session;
mod signaling;

pub use session::SessionId;
pub use signaling::{IceCandidate, IceServerConfig, PeerConfig, PeerOptions, SignalMessage};
