use crate::protocol::Direction;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown message type {id} ({direction})")]
    UnknownType { direction: Direction, id: u8 },

    #[error("unknown message name '{name}' ({direction})")]
    UnknownName { direction: Direction, name: String },

    #[error("truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("field values do not match layout: {0}")]
    LayoutMismatch(String),

    #[error("invalid layout: {0}")]
    InvalidLayout(String),
}

impl ProtocolError {
    /// Short stable label, used for diagnostics counters.
    pub fn label(&self) -> &'static str {
        match self {
            ProtocolError::EmptyFrame => "empty-frame",
            ProtocolError::UnknownType { .. } => "unknown-type",
            ProtocolError::UnknownName { .. } => "unknown-name",
            ProtocolError::Truncated { .. } => "truncated",
            ProtocolError::Malformed(_) => "malformed",
            ProtocolError::LayoutMismatch(_) => "layout-mismatch",
            ProtocolError::InvalidLayout(_) => "invalid-layout",
        }
    }
}
