//! Session engine for a single interactive media stream: signalling,
//! WebRTC negotiation, the binary data-channel protocol and the control
//! state layered on top of it.

pub mod channel;
pub mod error;
pub mod idle;
pub mod input;
pub mod negotiation;
pub mod ownership;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod transfer;
pub mod transport;

pub use channel::{
    ChannelDirection, DataChannelManager, Diagnostics, Dispatched, Dispatcher, EndpointState,
    MessageHandler,
};
pub use error::{
    ChannelError, NegotiationError, OwnershipError, SessionError, SignalingError, TransferError,
};
pub use idle::{IdleEvent, IdleMonitor};
pub use input::{EncoderSettings, InputEvent, LatencyProbeResult, MouseButton, Touch, TouchPhase};
pub use negotiation::{NegotiationState, SessionNegotiator};
pub use ownership::{Capability, OwnershipArbiter, OwnershipChange, TokenState};
pub use session::{
    MediaSink, SessionEvent, SessionHandle, SessionListener, SessionOrchestrator, SessionSnapshot,
};
pub use signaling::{SignalingConnector, SignalingEvent, SignalingOutput, WsSignaling};
pub use stats::{AggregatedStats, StatsAggregator};
pub use transfer::{ChunkReassembler, CompletedTransfer, TransferKind};
pub use transport::{
    DataChannelSink, MediaKind, MediaTrack, PeerTransport, PeerTransportFactory, TransportEvent,
    TransportStats, WebRtcTransportFactory,
};
