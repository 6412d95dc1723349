use crate::error::SignalingError;
use crate::signaling::SignalingOutput;
use pxstream_core::SignalMessage;
use std::fmt;

/// Everything the signalling side reports to the session loop. Each event
/// carries the generation of the connection that produced it.
pub enum SignalingEvent {
    Opened {
        generation: u64,
        output: Box<dyn SignalingOutput>,
    },
    ConnectFailed {
        generation: u64,
        error: SignalingError,
    },
    Message {
        generation: u64,
        message: SignalMessage,
    },
    Malformed {
        generation: u64,
        error: SignalingError,
    },
    Closed {
        generation: u64,
        reason: String,
    },
}

impl SignalingEvent {
    pub fn generation(&self) -> u64 {
        match self {
            SignalingEvent::Opened { generation, .. }
            | SignalingEvent::ConnectFailed { generation, .. }
            | SignalingEvent::Message { generation, .. }
            | SignalingEvent::Malformed { generation, .. }
            | SignalingEvent::Closed { generation, .. } => *generation,
        }
    }
}

impl fmt::Debug for SignalingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalingEvent::Opened { generation, .. } => {
                f.debug_struct("Opened").field("generation", generation).finish_non_exhaustive()
            }
            SignalingEvent::ConnectFailed { generation, error } => f
                .debug_struct("ConnectFailed")
                .field("generation", generation)
                .field("error", error)
                .finish(),
            SignalingEvent::Message {
                generation,
                message,
            } => f
                .debug_struct("Message")
                .field("generation", generation)
                .field("message", message)
                .finish(),
            SignalingEvent::Malformed { generation, error } => f
                .debug_struct("Malformed")
                .field("generation", generation)
                .field("error", error)
                .finish(),
            SignalingEvent::Closed { generation, reason } => f
                .debug_struct("Closed")
                .field("generation", generation)
                .field("reason", reason)
                .finish(),
        }
    }
}
