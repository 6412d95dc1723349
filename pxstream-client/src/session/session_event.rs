use crate::error::SessionError;
use crate::input::LatencyProbeResult;
use crate::negotiation::NegotiationState;
use crate::ownership::OwnershipChange;
use crate::stats::AggregatedStats;
use crate::transfer::CompletedTransfer;
use pxstream_core::FromPeerMessage;
use std::time::Duration;

/// Upward notifications delivered to every [`SessionListener`](crate::SessionListener).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: NegotiationState,
        to: NegotiationState,
    },
    /// Streamers offered by the signalling server. If none was picked
    /// automatically, answer with `SessionHandle::subscribe`.
    StreamerListReceived {
        ids: Vec<String>,
        auto_selected: Option<String>,
    },
    PlayerCount {
        count: u32,
    },
    /// A decoded peer message. Chunk messages are not repeated here; they
    /// surface as `TransferComplete`.
    Message(FromPeerMessage),
    OwnershipChanged(OwnershipChange),
    TransferComplete(CompletedTransfer),
    FreezeFrameCleared,
    LatencyProbe(LatencyProbeResult),
    /// Periodic or requested transport statistics while connected.
    Stats(AggregatedStats),
    IdleCountdown {
        grace: Duration,
    },
    IdleResumed,
    IdleTimeout,
    Error(SessionError),
    Disconnected {
        reason: String,
    },
}
