use crate::protocol::{FieldKind, ProtocolDefinition, ProtocolError};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to remote peer.
    ToPeer,
    /// Remote peer to client.
    FromPeer,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToPeer => f.write_str("to-peer"),
            Direction::FromPeer => f.write_str("from-peer"),
        }
    }
}

/// Names of the built-in messages.
pub mod names {
    pub const KEY_FRAME_REQUEST: &str = "key-frame-request";
    pub const REQUEST_QUALITY_CONTROL: &str = "request-quality-control";
    pub const FPS_REQUEST: &str = "fps-request";
    pub const BITRATE_REQUEST: &str = "bitrate-request";
    pub const START_STREAMING: &str = "start-streaming";
    pub const STOP_STREAMING: &str = "stop-streaming";
    pub const LATENCY_TEST: &str = "latency-test";
    pub const REQUEST_INITIAL_SETTINGS: &str = "request-initial-settings";
    pub const TEST_ECHO: &str = "test-echo";
    pub const UI_INTERACTION: &str = "ui-interaction";
    pub const COMMAND: &str = "command";
    pub const KEY_DOWN: &str = "key-down";
    pub const KEY_UP: &str = "key-up";
    pub const KEY_PRESS: &str = "key-press";
    pub const MOUSE_ENTER: &str = "mouse-enter";
    pub const MOUSE_LEAVE: &str = "mouse-leave";
    pub const MOUSE_DOWN: &str = "mouse-down";
    pub const MOUSE_UP: &str = "mouse-up";
    pub const MOUSE_MOVE: &str = "mouse-move";
    pub const MOUSE_WHEEL: &str = "mouse-wheel";
    pub const MOUSE_DOUBLE: &str = "mouse-double";
    pub const TOUCH_START: &str = "touch-start";
    pub const TOUCH_END: &str = "touch-end";
    pub const TOUCH_MOVE: &str = "touch-move";
    pub const GAMEPAD_BUTTON_PRESSED: &str = "gamepad-button-pressed";
    pub const GAMEPAD_BUTTON_RELEASED: &str = "gamepad-button-released";
    pub const GAMEPAD_ANALOG: &str = "gamepad-analog";
    pub const GAMEPAD_CONNECTED: &str = "gamepad-connected";
    pub const GAMEPAD_DISCONNECTED: &str = "gamepad-disconnected";

    pub const QUALITY_CONTROL_OWNERSHIP: &str = "quality-control-ownership";
    pub const RESPONSE: &str = "response";
    pub const FREEZE_FRAME: &str = "freeze-frame";
    pub const FREEZE_FRAME_CHUNK: &str = "freeze-frame-chunk";
    pub const UNFREEZE_FRAME: &str = "unfreeze-frame";
    pub const VIDEO_ENCODER_AVG_QP: &str = "video-encoder-avg-qp";
    pub const INITIAL_SETTINGS: &str = "initial-settings";
    pub const FILE_EXTENSION: &str = "file-extension";
    pub const FILE_MIME_TYPE: &str = "file-mime-type";
    pub const FILE_CONTENTS: &str = "file-contents";
    pub const FILE_CONTENTS_CHUNK: &str = "file-contents-chunk";
    pub const INPUT_CONTROL_OWNERSHIP: &str = "input-control-ownership";
    pub const GAMEPAD_RESPONSE: &str = "gamepad-response";
    pub const PROTOCOL: &str = "protocol";
}

/// Layout and identity of one message type in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSpec {
    pub direction: Direction,
    pub id: u8,
    pub name: String,
    pub layout: Vec<FieldKind>,
}

impl MessageSpec {
    pub fn new(
        direction: Direction,
        id: u8,
        name: impl Into<String>,
        layout: Vec<FieldKind>,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        validate_layout(&name, &layout)?;
        Ok(Self {
            direction,
            id,
            name,
            layout,
        })
    }
}

fn validate_layout(name: &str, layout: &[FieldKind]) -> Result<(), ProtocolError> {
    for (index, kind) in layout.iter().enumerate() {
        match kind {
            FieldKind::Bytes if index + 1 != layout.len() => {
                return Err(ProtocolError::InvalidLayout(format!(
                    "'{name}': bytes field must be last"
                )));
            }
            FieldKind::List(record) => {
                if record.is_empty() || record.iter().any(|k| k.fixed_size().is_none()) {
                    return Err(ProtocolError::InvalidLayout(format!(
                        "'{name}': list records must be non-empty and fixed-width"
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Registry of message types keyed by (direction, type id).
///
/// Registering an id that already exists replaces the previous entry, and a
/// name that moves to a new id releases its old id.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: HashMap<(Direction, u8), MessageSpec>,
    ids: HashMap<(Direction, String), u8>,
}

impl MessageCatalog {
    /// Catalog pre-populated with the built-in messages.
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        for spec in builtin_specs() {
            catalog.register(spec);
        }
        catalog
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Insert `spec`, returning whatever previously held its (direction, id).
    pub fn register(&mut self, spec: MessageSpec) -> Option<MessageSpec> {
        let key = (spec.direction, spec.id);
        let name_key = (spec.direction, spec.name.clone());

        if let Some(old_id) = self.ids.get(&name_key).copied() {
            if old_id != spec.id {
                self.entries.remove(&(spec.direction, old_id));
            }
        }

        let replaced = self.entries.insert(key, spec);
        if let Some(old) = &replaced {
            if self.ids.get(&(old.direction, old.name.clone())) == Some(&old.id) {
                self.ids.remove(&(old.direction, old.name.clone()));
            }
            debug!(
                "Catalog entry {} #{} '{}' replaced",
                old.direction, old.id, old.name
            );
        }
        self.ids.insert(name_key, key.1);
        replaced
    }

    pub fn get(&self, direction: Direction, id: u8) -> Option<&MessageSpec> {
        self.entries.get(&(direction, id))
    }

    pub fn id_of(&self, direction: Direction, name: &str) -> Option<u8> {
        self.ids.get(&(direction, name.to_owned())).copied()
    }

    pub fn by_name(&self, direction: Direction, name: &str) -> Result<&MessageSpec, ProtocolError> {
        self.id_of(direction, name)
            .and_then(|id| self.get(direction, id))
            .ok_or_else(|| ProtocolError::UnknownName {
                direction,
                name: name.to_owned(),
            })
    }

    /// Merge a peer-supplied protocol definition. Returns the number of
    /// entries registered.
    ///
    /// A peer entry may change the layout of a built-in id but never its
    /// name: the session routes ownership flags, transfers and protocol
    /// updates by built-in name, so a differently named entry for the same
    /// id keeps the built-in name.
    pub fn merge_definition(&mut self, definition: ProtocolDefinition) -> usize {
        let count = definition.messages.len();
        for mut spec in definition.messages {
            if let Some(existing) = self.get(spec.direction, spec.id) {
                if existing.name != spec.name && is_builtin(spec.direction, &existing.name) {
                    warn!(
                        "Peer definition names {} #{} '{}'; keeping built-in name '{}'",
                        spec.direction, spec.id, spec.name, existing.name
                    );
                    spec.name = existing.name.clone();
                }
            }
            self.register(spec);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn specs(&self, direction: Direction) -> impl Iterator<Item = &MessageSpec> {
        self.entries
            .values()
            .filter(move |spec| spec.direction == direction)
    }
}

fn is_builtin(direction: Direction, name: &str) -> bool {
    builtin_specs()
        .iter()
        .any(|spec| spec.direction == direction && spec.name == name)
}

fn builtin_specs() -> Vec<MessageSpec> {
    use FieldKind::*;
    use names::*;

    let touch = || List(vec![U16, U16, U8, U8, U8]);

    let to_peer: Vec<(u8, &str, Vec<FieldKind>)> = vec![
        (0, KEY_FRAME_REQUEST, vec![]),
        (1, REQUEST_QUALITY_CONTROL, vec![]),
        (2, FPS_REQUEST, vec![U8]),
        (3, BITRATE_REQUEST, vec![U32]),
        (4, START_STREAMING, vec![]),
        (5, STOP_STREAMING, vec![]),
        (6, LATENCY_TEST, vec![Utf16]),
        (7, REQUEST_INITIAL_SETTINGS, vec![]),
        (8, TEST_ECHO, vec![Utf16]),
        (50, UI_INTERACTION, vec![Utf16]),
        (51, COMMAND, vec![Utf16]),
        (60, KEY_DOWN, vec![U8, U8]),
        (61, KEY_UP, vec![U8]),
        (62, KEY_PRESS, vec![U16]),
        (70, MOUSE_ENTER, vec![]),
        (71, MOUSE_LEAVE, vec![]),
        (72, MOUSE_DOWN, vec![U8, U16, U16]),
        (73, MOUSE_UP, vec![U8, U16, U16]),
        (74, MOUSE_MOVE, vec![U16, U16, I16, I16]),
        (75, MOUSE_WHEEL, vec![I16, U16, U16]),
        (76, MOUSE_DOUBLE, vec![U8, U16, U16]),
        (80, TOUCH_START, vec![touch()]),
        (81, TOUCH_END, vec![touch()]),
        (82, TOUCH_MOVE, vec![touch()]),
        (90, GAMEPAD_BUTTON_PRESSED, vec![U8, U8, U8]),
        (91, GAMEPAD_BUTTON_RELEASED, vec![U8, U8]),
        (92, GAMEPAD_ANALOG, vec![U8, U8, F64]),
        (93, GAMEPAD_CONNECTED, vec![]),
        (94, GAMEPAD_DISCONNECTED, vec![U8]),
    ];

    let from_peer: Vec<(u8, &str, Vec<FieldKind>)> = vec![
        (0, QUALITY_CONTROL_OWNERSHIP, vec![U8]),
        (1, RESPONSE, vec![Utf16]),
        (2, COMMAND, vec![Utf16]),
        (3, FREEZE_FRAME, vec![U32, Bytes]),
        (4, UNFREEZE_FRAME, vec![]),
        (5, VIDEO_ENCODER_AVG_QP, vec![U16]),
        (6, LATENCY_TEST, vec![Utf16]),
        (7, INITIAL_SETTINGS, vec![Utf16]),
        (8, FILE_EXTENSION, vec![Utf16]),
        (9, FILE_MIME_TYPE, vec![Utf16]),
        (10, FILE_CONTENTS, vec![U32, Bytes]),
        (11, TEST_ECHO, vec![Utf16]),
        (12, INPUT_CONTROL_OWNERSHIP, vec![U8]),
        (13, GAMEPAD_RESPONSE, vec![Utf16]),
        (14, FREEZE_FRAME_CHUNK, vec![Bytes]),
        (15, FILE_CONTENTS_CHUNK, vec![Bytes]),
        (255, PROTOCOL, vec![Utf16]),
    ];

    to_peer
        .into_iter()
        .map(|entry| (Direction::ToPeer, entry))
        .chain(
            from_peer
                .into_iter()
                .map(|entry| (Direction::FromPeer, entry)),
        )
        .map(|(direction, (id, name, layout))| MessageSpec {
            direction,
            id,
            name: name.to_owned(),
            layout,
        })
        .collect()
}
