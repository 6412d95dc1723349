use crate::error::SignalingError;
use crate::signaling::SignalingEvent;
use async_trait::async_trait;
use pxstream_core::{IceCandidate, SignalMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outbound half of an open signalling connection.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send_signal(&self, message: SignalMessage) -> Result<(), SignalingError>;

    /// Close the connection. Further sends fail with `NotOpen`.
    async fn close(&self);

    async fn send_offer(&self, sdp: String) -> Result<(), SignalingError> {
        self.send_signal(SignalMessage::Offer { sdp }).await
    }

    async fn send_answer(&self, sdp: String) -> Result<(), SignalingError> {
        self.send_signal(SignalMessage::Answer { sdp }).await
    }

    async fn send_ice(&self, candidate: IceCandidate) -> Result<(), SignalingError> {
        self.send_signal(SignalMessage::IceCandidate { candidate }).await
    }
}

/// Opens signalling connections.
///
/// Inbound frames are pushed to `events` tagged with `generation` until the
/// connection closes or `cancel` fires.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        generation: u64,
        events: mpsc::Sender<SignalingEvent>,
        cancel: CancellationToken,
    ) -> Result<Box<dyn SignalingOutput>, SignalingError>;
}
