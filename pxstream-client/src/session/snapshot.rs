use crate::negotiation::NegotiationState;
use crate::ownership::TokenState;
use pxstream_core::SessionId;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: NegotiationState,
    pub relay: bool,
    pub quality_control: TokenState,
    pub input_control: TokenState,
    pub preferred_codec: Option<String>,
    pub streamer_id: Option<String>,
    pub last_disconnect_reason: Option<String>,
}
