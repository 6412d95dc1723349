pub mod config;
pub mod model;
pub mod protocol;
pub mod sdp;
pub mod utils;

pub use config::{RetryPolicy, SettingsLookup, StreamConfig};
pub use model::{
    IceCandidate, IceServerConfig, PeerConfig, PeerOptions, SessionId, SignalMessage,
};
pub use protocol::{
    Direction, FieldKind, FieldValue, FromPeerMessage, MessageCatalog, MessageSpec,
    ProtocolError, ToPeerMessage,
};
