use crate::protocol::{Direction, FieldKind, MessageSpec, ProtocolError};
use serde_json::Value;

/// Catalog extension announced by the peer at runtime.
///
/// JSON shape: `{"Direction": 0 | 1, "<name>": {"id": n, "structure": [..]}, ..}`
/// where 0 is client-to-peer and 1 is peer-to-client.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDefinition {
    pub direction: Direction,
    pub messages: Vec<MessageSpec>,
}

impl ProtocolDefinition {
    pub fn parse(json: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ProtocolError::Malformed(format!("protocol definition: {e}")))?;
        let Value::Object(entries) = value else {
            return Err(ProtocolError::Malformed(
                "protocol definition is not an object".into(),
            ));
        };

        let direction = match entries.get("Direction").and_then(Value::as_u64) {
            Some(0) => Direction::ToPeer,
            Some(1) => Direction::FromPeer,
            other => {
                return Err(ProtocolError::Malformed(format!(
                    "protocol definition has invalid Direction {other:?}"
                )));
            }
        };

        let mut messages = Vec::with_capacity(entries.len().saturating_sub(1));
        for (name, entry) in entries.iter().filter(|(key, _)| key.as_str() != "Direction") {
            let id = entry
                .get("id")
                .and_then(Value::as_u64)
                .and_then(|id| u8::try_from(id).ok())
                .ok_or_else(|| ProtocolError::Malformed(format!("'{name}' has no valid id")))?;

            let layout = match entry.get("structure") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .ok_or_else(|| {
                                ProtocolError::Malformed(format!("'{name}' structure entry {item}"))
                            })
                            .and_then(str::parse::<FieldKind>)
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Some(other) => {
                    return Err(ProtocolError::Malformed(format!(
                        "'{name}' structure is {other}"
                    )));
                }
            };

            messages.push(MessageSpec::new(direction, id, name.as_str(), layout)?);
        }

        Ok(Self {
            direction,
            messages,
        })
    }
}
