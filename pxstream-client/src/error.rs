use crate::ownership::Capability;
use crate::transfer::TransferKind;
use pxstream_core::ProtocolError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalingError {
    #[error("signalling connection failed: {0}")]
    ConnectFailed(String),

    #[error("signalling connection lost: {0}")]
    TransportLost(String),

    #[error("malformed signalling frame: {0}")]
    MalformedFrame(String),

    #[error("signalling connection is not open")]
    NotOpen,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NegotiationError {
    #[error("session description rejected: {0}")]
    DescriptionRejected(String),

    #[error("candidate gathering timed out")]
    GatheringTimeout,

    #[error("data channel never opened")]
    ChannelNeverOpened,

    #[error("relay required but peer config lists no relay server")]
    RelayUnavailable,

    #[error("peer transport failed: {0}")]
    Transport(String),

    #[error("signalling failed: {0}")]
    Signaling(#[from] SignalingError),

    #[error("negotiation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("channel endpoint is not open")]
    ChannelNotReady,

    #[error("no endpoint for this direction")]
    UnknownEndpoint,

    #[error("channel transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransferError {
    #[error("{kind} transfer received {received} bytes, {declared} declared")]
    Overrun {
        kind: TransferKind,
        declared: usize,
        received: usize,
    },

    #[error("{kind} transfer superseded after {received} of {declared} bytes")]
    Superseded {
        kind: TransferKind,
        declared: usize,
        received: usize,
    },

    #[error("{kind} chunk with no transfer in progress")]
    NoActiveTransfer { kind: TransferKind },

    #[error("{kind} header declares an empty transfer")]
    Empty { kind: TransferKind },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OwnershipError {
    #[error("{0} control request denied")]
    Denied(Capability),

    #[error("{0} control is not held by this session")]
    NotOwned(Capability),
}

/// Error surfaced through the session handle and listener events.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,

    #[error("no live session")]
    NotConnected,

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Ownership(#[from] OwnershipError),
}
