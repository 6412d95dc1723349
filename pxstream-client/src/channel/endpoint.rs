use crate::transport::DataChannelSink;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDirection {
    Bidirectional,
    SendOnly,
    ReceiveOnly,
}

impl ChannelDirection {
    pub fn can_send(self) -> bool {
        self != ChannelDirection::ReceiveOnly
    }

    pub fn can_receive(self) -> bool {
        self != ChannelDirection::SendOnly
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub label: String,
    pub direction: ChannelDirection,
}

impl EndpointSpec {
    pub fn new(label: impl Into<String>, direction: ChannelDirection) -> Self {
        Self {
            label: label.into(),
            direction,
        }
    }
}

/// One data channel as tracked by the manager. Sends are accepted only in
/// [`EndpointState::Open`].
pub struct ChannelEndpoint {
    pub spec: EndpointSpec,
    pub state: EndpointState,
    pub(crate) sink: Option<Arc<dyn DataChannelSink>>,
}

impl ChannelEndpoint {
    pub fn new(spec: EndpointSpec) -> Self {
        Self {
            spec,
            state: EndpointState::Connecting,
            sink: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == EndpointState::Open
    }
}
