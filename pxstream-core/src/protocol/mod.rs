//! Binary data-channel protocol: field layouts, the message catalog, the
//! frame codec and the typed messages built on top of them.

mod catalog;
mod codec;
mod definition;
mod error;
mod field;
mod messages;

pub use catalog::{Direction, MessageCatalog, MessageSpec, names};
pub use codec::{decode_fields, encode_fields, encode_frame, split_frame};
pub use definition::ProtocolDefinition;
pub use error::ProtocolError;
pub use field::{FieldKind, FieldValue};
pub use messages::{FieldReader, FromPeerMessage, ToPeerMessage, TouchPoint};
