use crate::transport::DataChannelSink;
use bytes::Bytes;
use pxstream_core::IceCandidate;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// Remote media track announced by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub kind: MediaKind,
    pub id: String,
    pub codec: String,
}

/// Events the peer transport reports to the session loop. Every event
/// carries the generation of the transport that produced it, so events from
/// a torn down transport can be dropped.
pub enum TransportEvent {
    /// A data channel is open and ready to carry frames.
    ChannelOpen {
        generation: u64,
        label: String,
        sink: Arc<dyn DataChannelSink>,
    },

    ChannelClosed {
        generation: u64,
        label: String,
    },

    /// Binary frame received on the channel `label`.
    Message {
        generation: u64,
        label: String,
        data: Bytes,
    },

    /// Local ICE candidate to trickle to the peer through signalling.
    CandidateGenerated {
        generation: u64,
        candidate: IceCandidate,
    },

    /// ICE/DTLS connectivity is up.
    PeerConnected {
        generation: u64,
    },

    /// The peer connection failed or closed.
    Disconnected {
        generation: u64,
        reason: String,
    },

    Track {
        generation: u64,
        track: MediaTrack,
    },
}

impl TransportEvent {
    pub fn generation(&self) -> u64 {
        match self {
            TransportEvent::ChannelOpen { generation, .. }
            | TransportEvent::ChannelClosed { generation, .. }
            | TransportEvent::Message { generation, .. }
            | TransportEvent::CandidateGenerated { generation, .. }
            | TransportEvent::PeerConnected { generation }
            | TransportEvent::Disconnected { generation, .. }
            | TransportEvent::Track { generation, .. } => *generation,
        }
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::ChannelOpen {
                generation, label, ..
            } => write!(f, "ChannelOpen({generation}, {label})"),
            TransportEvent::ChannelClosed { generation, label } => {
                write!(f, "ChannelClosed({generation}, {label})")
            }
            TransportEvent::Message {
                generation,
                label,
                data,
            } => write!(f, "Message({generation}, {label}, {} bytes)", data.len()),
            TransportEvent::CandidateGenerated {
                generation,
                candidate,
            } => write!(f, "CandidateGenerated({generation}, {})", candidate.candidate),
            TransportEvent::PeerConnected { generation } => write!(f, "PeerConnected({generation})"),
            TransportEvent::Disconnected { generation, reason } => {
                write!(f, "Disconnected({generation}, {reason})")
            }
            TransportEvent::Track { generation, track } => {
                write!(f, "Track({generation}, {:?} {})", track.kind, track.id)
            }
        }
    }
}
