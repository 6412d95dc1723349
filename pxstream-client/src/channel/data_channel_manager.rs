use crate::channel::{ChannelDirection, ChannelEndpoint, EndpointSpec, EndpointState};
use crate::error::ChannelError;
use crate::transport::DataChannelSink;
use bytes::Bytes;
use pxstream_core::utils::{DIRECT_CHANNEL_LABEL, RELAY_RECV_LABEL, RELAY_SEND_LABEL};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the one (direct) or two (relay) channel endpoints of a session.
#[derive(Default)]
pub struct DataChannelManager {
    endpoints: Vec<ChannelEndpoint>,
    relay: bool,
}

impl DataChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint; it stays `Connecting` until the transport
    /// reports it open.
    pub fn open(&mut self, spec: EndpointSpec) {
        debug!("Expecting channel '{}' ({:?})", spec.label, spec.direction);
        self.endpoints.retain(|e| e.spec.label != spec.label);
        self.endpoints.push(ChannelEndpoint::new(spec));
    }

    pub fn expect_direct(&mut self) {
        self.endpoints.clear();
        self.relay = false;
        self.open(EndpointSpec::new(DIRECT_CHANNEL_LABEL, ChannelDirection::Bidirectional));
    }

    pub fn expect_relay(&mut self) {
        self.endpoints.clear();
        self.relay = true;
        self.open(EndpointSpec::new(RELAY_SEND_LABEL, ChannelDirection::SendOnly));
        self.open(EndpointSpec::new(RELAY_RECV_LABEL, ChannelDirection::ReceiveOnly));
    }

    pub fn is_relay(&self) -> bool {
        self.relay
    }

    fn endpoint_mut(&mut self, label: &str) -> Option<&mut ChannelEndpoint> {
        if let Some(index) = self.endpoints.iter().position(|e| e.spec.label == label) {
            return self.endpoints.get_mut(index);
        }
        // in direct mode the peer picks the label of the single channel
        if !self.relay && self.endpoints.len() == 1 {
            return self.endpoints.first_mut();
        }
        None
    }

    /// Returns true when `label` matched an expected endpoint.
    pub fn on_open(&mut self, label: &str, sink: Arc<dyn DataChannelSink>) -> bool {
        let Some(endpoint) = self.endpoint_mut(label) else {
            warn!("Ignoring unexpected data channel '{}'", label);
            return false;
        };
        info!("Channel '{}' open", label);
        endpoint.state = EndpointState::Open;
        endpoint.sink = Some(sink);
        true
    }

    pub fn on_closed(&mut self, label: &str) {
        if let Some(endpoint) = self.endpoint_mut(label) {
            info!("Channel '{}' closed", label);
            endpoint.state = EndpointState::Closed;
            endpoint.sink = None;
        }
    }

    pub fn all_open(&self) -> bool {
        !self.endpoints.is_empty() && self.endpoints.iter().all(ChannelEndpoint::is_open)
    }

    pub fn state_of(&self, label: &str) -> Option<EndpointState> {
        self.endpoints
            .iter()
            .find(|e| e.spec.label == label)
            .map(|e| e.state)
    }

    /// Send one frame on the send-capable endpoint. Fails with
    /// `ChannelNotReady`, touching nothing, unless that endpoint is open.
    pub async fn send(&self, frame: Bytes) -> Result<(), ChannelError> {
        let endpoint = self
            .endpoints
            .iter()
            .find(|e| e.spec.direction.can_send())
            .ok_or(ChannelError::UnknownEndpoint)?;

        let (EndpointState::Open, Some(sink)) = (endpoint.state, endpoint.sink.as_ref()) else {
            return Err(ChannelError::ChannelNotReady);
        };

        sink.send(frame)
            .await
            .map_err(|e| ChannelError::Transport(format!("{e:#}")))
    }

    /// Pass an inbound frame through if it arrived on a receive-capable endpoint.
    pub fn accept_inbound(&self, label: &str, data: Bytes) -> Option<Bytes> {
        let endpoint = self
            .endpoints
            .iter()
            .find(|e| e.spec.label == label)
            .or_else(|| (!self.relay && self.endpoints.len() == 1).then(|| &self.endpoints[0]))?;

        if !endpoint.spec.direction.can_receive() {
            warn!("Dropping {} byte frame on send-only channel '{}'", data.len(), label);
            return None;
        }
        Some(data)
    }

    /// Close every endpoint and forget them.
    pub async fn close_all(&mut self) {
        for endpoint in &mut self.endpoints {
            endpoint.state = EndpointState::Closing;
            if let Some(sink) = endpoint.sink.take() {
                if let Err(e) = sink.close().await {
                    debug!("Closing channel '{}' failed: {:#}", endpoint.spec.label, e);
                }
            }
            endpoint.state = EndpointState::Closed;
        }
        self.endpoints.clear();
        self.relay = false;
    }
}
