use crate::transport::TransportEvent;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use pxstream_core::{IceCandidate, IceServerConfig};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Parameters for one peer connection.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub generation: u64,
    pub ice_servers: Vec<IceServerConfig>,
    /// Restrict ICE to relay candidates.
    pub relay_only: bool,
    /// Send microphone audio in addition to receiving.
    pub send_audio: bool,
}

/// Cumulative inbound video counters of one peer connection.
///
/// Counters only grow for the lifetime of a transport. Fields the
/// underlying stack does not report stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportStats {
    pub bytes_received: u64,
    pub packets_received: u64,
    pub packets_lost: Option<u64>,
    pub frames_decoded: Option<u64>,
}

/// Write side of one open data channel.
///
/// Handed to the session inside [`TransportEvent::ChannelOpen`]. The
/// session owns it until the channel closes or the session tears down, and
/// never writes to it after calling [`close`](Self::close).
#[async_trait]
pub trait DataChannelSink: Send + Sync {
    /// Label the channel was created or announced with.
    fn label(&self) -> &str;

    /// Write one complete protocol frame. Frames are never split.
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Close the channel. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// One WebRTC peer connection, created per negotiation attempt.
///
/// Methods are called only from the session loop, one at a time, and any of
/// them may be abandoned mid-flight when the session disconnects or a
/// deadline passes. Asynchronous results (local candidates, channel open,
/// inbound frames, remote tracks, connectivity) are reported as
/// [`TransportEvent`]s tagged with the generation from the
/// [`TransportRequest`]; events from an older generation are ignored.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create a local offer. The caller may rewrite it before setting it.
    async fn create_offer(&self) -> Result<String>;

    /// Create an answer to the remote offer already set.
    async fn create_answer(&self) -> Result<String>;

    async fn set_local_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    /// Apply the peer's description. An error means the peer's SDP was
    /// rejected and the attempt fails.
    async fn set_remote_description(&self, kind: SdpKind, sdp: String) -> Result<()>;

    /// Apply one remote candidate. Only called once a remote description
    /// is set; earlier candidates are buffered by the caller.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Create a data channel. With `negotiated_id` both sides create the
    /// channel out of band under that SCTP stream id.
    async fn create_data_channel(&self, label: &str, negotiated_id: Option<u16>) -> Result<()>;

    /// Current cumulative inbound video counters.
    async fn stats(&self) -> Result<TransportStats>;

    /// Release the connection. No events follow a completed close.
    async fn close(&self) -> Result<()>;
}

/// Builds a [`PeerTransport`] for each negotiation attempt.
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    /// Create a connection and start gathering local candidates. `events`
    /// receives everything the transport reports asynchronously.
    async fn create(
        &self,
        request: TransportRequest,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
