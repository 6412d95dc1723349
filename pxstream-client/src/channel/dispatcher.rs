use crate::channel::Diagnostics;
use bytes::Bytes;
use pxstream_core::protocol::{
    Direction, FieldValue, FromPeerMessage, MessageCatalog, ProtocolDefinition, ProtocolError,
    ToPeerMessage, decode_fields, split_frame,
};
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Handler for a message name registered at runtime.
pub type MessageHandler = Box<dyn FnMut(&[FieldValue]) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Decoded into a typed message for the session to route.
    Message(FromPeerMessage),
    /// Consumed by a registered handler.
    Handled { name: String },
    /// A protocol definition was merged into the catalog.
    CatalogExtended { direction: Direction, added: usize },
}

/// Decodes inbound frames against the catalog and routes them.
///
/// Auto-replies produced while dispatching (test echo) are queued in an
/// outbox instead of being sent from inside the dispatch.
pub struct Dispatcher {
    catalog: MessageCatalog,
    handlers: HashMap<String, MessageHandler>,
    diagnostics: Diagnostics,
    outbox: Vec<ToPeerMessage>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(MessageCatalog::new())
    }
}

impl Dispatcher {
    pub fn new(catalog: MessageCatalog) -> Self {
        Self {
            catalog,
            handlers: HashMap::new(),
            diagnostics: Diagnostics::default(),
            outbox: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut MessageCatalog {
        &mut self.catalog
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    /// Register a handler for inbound messages named `name`. Replaces (and
    /// returns) any earlier handler for that name.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: MessageHandler) -> Option<MessageHandler> {
        self.handlers.insert(name.into(), handler)
    }

    pub fn drain_outbox(&mut self) -> Vec<ToPeerMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Encode an outbound message with the current catalog.
    pub fn encode(&self, message: &ToPeerMessage) -> Result<Bytes, ProtocolError> {
        message.encode(&self.catalog)
    }

    /// Decode and route one inbound frame. Errors are recoverable: the frame
    /// is dropped and the matching counter bumped.
    pub fn dispatch(&mut self, frame: &[u8]) -> Result<Dispatched, ProtocolError> {
        let result = self.dispatch_inner(frame);
        match &result {
            Ok(_) => self.diagnostics.dispatched += 1,
            Err(err) => {
                match err {
                    ProtocolError::UnknownType { .. } => self.diagnostics.unknown_type += 1,
                    ProtocolError::Truncated { .. } => self.diagnostics.truncated += 1,
                    _ => self.diagnostics.malformed += 1,
                }
                warn!("Dropped inbound frame: {}", err);
            }
        }
        result
    }

    fn dispatch_inner(&mut self, frame: &[u8]) -> Result<Dispatched, ProtocolError> {
        let (id, body) = split_frame(frame)?;
        let spec = self
            .catalog
            .get(Direction::FromPeer, id)
            .ok_or(ProtocolError::UnknownType {
                direction: Direction::FromPeer,
                id,
            })?;
        let fields = decode_fields(&spec.layout, body)?;
        let name = spec.name.clone();
        trace!("<- {} ({} bytes)", name, frame.len());

        if let Some(handler) = self.handlers.get_mut(&name) {
            handler(&fields);
            return Ok(Dispatched::Handled { name });
        }

        let message = FromPeerMessage::from_fields(&name, fields)?;
        match &message {
            FromPeerMessage::Protocol { definition } => {
                let definition = ProtocolDefinition::parse(definition)?;
                let direction = definition.direction;
                let added = self.catalog.merge_definition(definition);
                info!("Catalog extended with {} {} message(s)", added, direction);
                return Ok(Dispatched::CatalogExtended { direction, added });
            }
            FromPeerMessage::TestEcho { text } => {
                debug!("Queueing test echo reply");
                self.outbox.push(ToPeerMessage::TestEcho { text: text.clone() });
            }
            FromPeerMessage::Custom { name, .. } => {
                debug!("No handler for '{}'", name);
                self.diagnostics.handler_less += 1;
            }
            _ => {}
        }
        Ok(Dispatched::Message(message))
    }
}
