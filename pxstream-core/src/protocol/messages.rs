use crate::protocol::{Direction, FieldValue, MessageCatalog, ProtocolError, encode_frame, names};
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    pub x: u16,
    pub y: u16,
    pub id: u8,
    pub force: u8,
    pub valid: bool,
}

/// Messages the client sends to the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum ToPeerMessage {
    KeyFrameRequest,
    RequestQualityControl,
    FpsRequest { fps: u8 },
    BitrateRequest { max_bitrate_kbps: u32 },
    StartStreaming,
    StopStreaming,
    LatencyTest { probe: String },
    RequestInitialSettings,
    TestEcho { text: String },
    UiInteraction { descriptor: String },
    Command { descriptor: String },
    KeyDown { key_code: u8, is_repeat: bool },
    KeyUp { key_code: u8 },
    KeyPress { char_code: u16 },
    MouseEnter,
    MouseLeave,
    MouseDown { button: u8, x: u16, y: u16 },
    MouseUp { button: u8, x: u16, y: u16 },
    MouseMove { x: u16, y: u16, dx: i16, dy: i16 },
    MouseWheel { delta: i16, x: u16, y: u16 },
    MouseDouble { button: u8, x: u16, y: u16 },
    TouchStart { touches: Vec<TouchPoint> },
    TouchEnd { touches: Vec<TouchPoint> },
    TouchMove { touches: Vec<TouchPoint> },
    GamepadButtonPressed { controller: u8, button: u8, is_repeat: bool },
    GamepadButtonReleased { controller: u8, button: u8 },
    GamepadAnalog { controller: u8, axis: u8, value: f64 },
    GamepadConnected,
    GamepadDisconnected { controller: u8 },
    /// A message registered at runtime, addressed by catalog name.
    Custom { name: String, fields: Vec<FieldValue> },
}

impl ToPeerMessage {
    pub fn name(&self) -> &str {
        use names::*;
        match self {
            ToPeerMessage::KeyFrameRequest => KEY_FRAME_REQUEST,
            ToPeerMessage::RequestQualityControl => REQUEST_QUALITY_CONTROL,
            ToPeerMessage::FpsRequest { .. } => FPS_REQUEST,
            ToPeerMessage::BitrateRequest { .. } => BITRATE_REQUEST,
            ToPeerMessage::StartStreaming => START_STREAMING,
            ToPeerMessage::StopStreaming => STOP_STREAMING,
            ToPeerMessage::LatencyTest { .. } => LATENCY_TEST,
            ToPeerMessage::RequestInitialSettings => REQUEST_INITIAL_SETTINGS,
            ToPeerMessage::TestEcho { .. } => TEST_ECHO,
            ToPeerMessage::UiInteraction { .. } => UI_INTERACTION,
            ToPeerMessage::Command { .. } => COMMAND,
            ToPeerMessage::KeyDown { .. } => KEY_DOWN,
            ToPeerMessage::KeyUp { .. } => KEY_UP,
            ToPeerMessage::KeyPress { .. } => KEY_PRESS,
            ToPeerMessage::MouseEnter => MOUSE_ENTER,
            ToPeerMessage::MouseLeave => MOUSE_LEAVE,
            ToPeerMessage::MouseDown { .. } => MOUSE_DOWN,
            ToPeerMessage::MouseUp { .. } => MOUSE_UP,
            ToPeerMessage::MouseMove { .. } => MOUSE_MOVE,
            ToPeerMessage::MouseWheel { .. } => MOUSE_WHEEL,
            ToPeerMessage::MouseDouble { .. } => MOUSE_DOUBLE,
            ToPeerMessage::TouchStart { .. } => TOUCH_START,
            ToPeerMessage::TouchEnd { .. } => TOUCH_END,
            ToPeerMessage::TouchMove { .. } => TOUCH_MOVE,
            ToPeerMessage::GamepadButtonPressed { .. } => GAMEPAD_BUTTON_PRESSED,
            ToPeerMessage::GamepadButtonReleased { .. } => GAMEPAD_BUTTON_RELEASED,
            ToPeerMessage::GamepadAnalog { .. } => GAMEPAD_ANALOG,
            ToPeerMessage::GamepadConnected => GAMEPAD_CONNECTED,
            ToPeerMessage::GamepadDisconnected { .. } => GAMEPAD_DISCONNECTED,
            ToPeerMessage::Custom { name, .. } => name,
        }
    }

    /// True for messages that carry user input.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            ToPeerMessage::KeyDown { .. }
                | ToPeerMessage::KeyUp { .. }
                | ToPeerMessage::KeyPress { .. }
                | ToPeerMessage::MouseEnter
                | ToPeerMessage::MouseLeave
                | ToPeerMessage::MouseDown { .. }
                | ToPeerMessage::MouseUp { .. }
                | ToPeerMessage::MouseMove { .. }
                | ToPeerMessage::MouseWheel { .. }
                | ToPeerMessage::MouseDouble { .. }
                | ToPeerMessage::TouchStart { .. }
                | ToPeerMessage::TouchEnd { .. }
                | ToPeerMessage::TouchMove { .. }
                | ToPeerMessage::GamepadButtonPressed { .. }
                | ToPeerMessage::GamepadButtonReleased { .. }
                | ToPeerMessage::GamepadAnalog { .. }
                | ToPeerMessage::GamepadConnected
                | ToPeerMessage::GamepadDisconnected { .. }
        )
    }

    /// True for requests that change encoder quality.
    pub fn affects_quality(&self) -> bool {
        matches!(
            self,
            ToPeerMessage::FpsRequest { .. } | ToPeerMessage::BitrateRequest { .. }
        )
    }

    pub fn to_fields(&self) -> Vec<FieldValue> {
        use FieldValue::*;
        match self {
            ToPeerMessage::KeyFrameRequest
            | ToPeerMessage::RequestQualityControl
            | ToPeerMessage::StartStreaming
            | ToPeerMessage::StopStreaming
            | ToPeerMessage::RequestInitialSettings
            | ToPeerMessage::MouseEnter
            | ToPeerMessage::MouseLeave
            | ToPeerMessage::GamepadConnected => vec![],
            ToPeerMessage::FpsRequest { fps } => vec![U8(*fps)],
            ToPeerMessage::BitrateRequest { max_bitrate_kbps } => vec![U32(*max_bitrate_kbps)],
            ToPeerMessage::LatencyTest { probe } => vec![Text(probe.clone())],
            ToPeerMessage::TestEcho { text } => vec![Text(text.clone())],
            ToPeerMessage::UiInteraction { descriptor } | ToPeerMessage::Command { descriptor } => {
                vec![Text(descriptor.clone())]
            }
            ToPeerMessage::KeyDown { key_code, is_repeat } => {
                vec![U8(*key_code), U8(u8::from(*is_repeat))]
            }
            ToPeerMessage::KeyUp { key_code } => vec![U8(*key_code)],
            ToPeerMessage::KeyPress { char_code } => vec![U16(*char_code)],
            ToPeerMessage::MouseDown { button, x, y }
            | ToPeerMessage::MouseUp { button, x, y }
            | ToPeerMessage::MouseDouble { button, x, y } => vec![U8(*button), U16(*x), U16(*y)],
            ToPeerMessage::MouseMove { x, y, dx, dy } => vec![U16(*x), U16(*y), I16(*dx), I16(*dy)],
            ToPeerMessage::MouseWheel { delta, x, y } => vec![I16(*delta), U16(*x), U16(*y)],
            ToPeerMessage::TouchStart { touches }
            | ToPeerMessage::TouchEnd { touches }
            | ToPeerMessage::TouchMove { touches } => vec![List(
                touches
                    .iter()
                    .map(|t| vec![U16(t.x), U16(t.y), U8(t.id), U8(t.force), U8(u8::from(t.valid))])
                    .collect(),
            )],
            ToPeerMessage::GamepadButtonPressed {
                controller,
                button,
                is_repeat,
            } => vec![U8(*controller), U8(*button), U8(u8::from(*is_repeat))],
            ToPeerMessage::GamepadButtonReleased { controller, button } => {
                vec![U8(*controller), U8(*button)]
            }
            ToPeerMessage::GamepadAnalog {
                controller,
                axis,
                value,
            } => vec![U8(*controller), U8(*axis), F64(*value)],
            ToPeerMessage::GamepadDisconnected { controller } => vec![U8(*controller)],
            ToPeerMessage::Custom { fields, .. } => fields.clone(),
        }
    }

    /// Rebuild a typed message from its catalog name and decoded fields.
    /// Names outside the built-in set become [`ToPeerMessage::Custom`].
    pub fn from_fields(name: &str, fields: Vec<FieldValue>) -> Result<Self, ProtocolError> {
        use names::*;
        let mut r = FieldReader::new(name, fields);
        let message = match name {
            KEY_FRAME_REQUEST => ToPeerMessage::KeyFrameRequest,
            REQUEST_QUALITY_CONTROL => ToPeerMessage::RequestQualityControl,
            FPS_REQUEST => ToPeerMessage::FpsRequest { fps: r.u8()? },
            BITRATE_REQUEST => ToPeerMessage::BitrateRequest {
                max_bitrate_kbps: r.u32()?,
            },
            START_STREAMING => ToPeerMessage::StartStreaming,
            STOP_STREAMING => ToPeerMessage::StopStreaming,
            LATENCY_TEST => ToPeerMessage::LatencyTest { probe: r.text()? },
            REQUEST_INITIAL_SETTINGS => ToPeerMessage::RequestInitialSettings,
            TEST_ECHO => ToPeerMessage::TestEcho { text: r.text()? },
            UI_INTERACTION => ToPeerMessage::UiInteraction {
                descriptor: r.text()?,
            },
            COMMAND => ToPeerMessage::Command {
                descriptor: r.text()?,
            },
            KEY_DOWN => ToPeerMessage::KeyDown {
                key_code: r.u8()?,
                is_repeat: r.flag()?,
            },
            KEY_UP => ToPeerMessage::KeyUp { key_code: r.u8()? },
            KEY_PRESS => ToPeerMessage::KeyPress {
                char_code: r.u16()?,
            },
            MOUSE_ENTER => ToPeerMessage::MouseEnter,
            MOUSE_LEAVE => ToPeerMessage::MouseLeave,
            MOUSE_DOWN => ToPeerMessage::MouseDown {
                button: r.u8()?,
                x: r.u16()?,
                y: r.u16()?,
            },
            MOUSE_UP => ToPeerMessage::MouseUp {
                button: r.u8()?,
                x: r.u16()?,
                y: r.u16()?,
            },
            MOUSE_MOVE => ToPeerMessage::MouseMove {
                x: r.u16()?,
                y: r.u16()?,
                dx: r.i16()?,
                dy: r.i16()?,
            },
            MOUSE_WHEEL => ToPeerMessage::MouseWheel {
                delta: r.i16()?,
                x: r.u16()?,
                y: r.u16()?,
            },
            MOUSE_DOUBLE => ToPeerMessage::MouseDouble {
                button: r.u8()?,
                x: r.u16()?,
                y: r.u16()?,
            },
            TOUCH_START => ToPeerMessage::TouchStart {
                touches: r.touches()?,
            },
            TOUCH_END => ToPeerMessage::TouchEnd {
                touches: r.touches()?,
            },
            TOUCH_MOVE => ToPeerMessage::TouchMove {
                touches: r.touches()?,
            },
            GAMEPAD_BUTTON_PRESSED => ToPeerMessage::GamepadButtonPressed {
                controller: r.u8()?,
                button: r.u8()?,
                is_repeat: r.flag()?,
            },
            GAMEPAD_BUTTON_RELEASED => ToPeerMessage::GamepadButtonReleased {
                controller: r.u8()?,
                button: r.u8()?,
            },
            GAMEPAD_ANALOG => ToPeerMessage::GamepadAnalog {
                controller: r.u8()?,
                axis: r.u8()?,
                value: r.f64()?,
            },
            GAMEPAD_CONNECTED => ToPeerMessage::GamepadConnected,
            GAMEPAD_DISCONNECTED => ToPeerMessage::GamepadDisconnected {
                controller: r.u8()?,
            },
            other => {
                return Ok(ToPeerMessage::Custom {
                    name: other.to_owned(),
                    fields: r.into_rest(),
                });
            }
        };
        r.finish()?;
        Ok(message)
    }

    /// Encode this message as a frame using the ids currently in `catalog`.
    pub fn encode(&self, catalog: &MessageCatalog) -> Result<Bytes, ProtocolError> {
        let spec = catalog.by_name(Direction::ToPeer, self.name())?;
        encode_frame(spec, &self.to_fields())
    }
}

/// Messages the peer sends to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum FromPeerMessage {
    QualityControlOwnership { owned: bool },
    Response { text: String },
    Command { text: String },
    /// Starts a freeze-frame transfer: declared total and the first bytes.
    FreezeFrame { total_len: u32, chunk: Bytes },
    /// Continues the freeze-frame transfer in progress.
    FreezeFrameChunk { chunk: Bytes },
    UnfreezeFrame,
    VideoEncoderAvgQp { qp: u16 },
    LatencyTest { report: String },
    InitialSettings { settings: String },
    FileExtension { extension: String },
    FileMimeType { mime_type: String },
    /// Starts a file transfer, like `FreezeFrame`.
    FileContents { total_len: u32, chunk: Bytes },
    FileContentsChunk { chunk: Bytes },
    TestEcho { text: String },
    InputControlOwnership { owned: bool },
    GamepadResponse { text: String },
    Protocol { definition: String },
    /// A message registered at runtime, addressed by catalog name.
    Custom { name: String, fields: Vec<FieldValue> },
}

impl FromPeerMessage {
    pub fn name(&self) -> &str {
        use names::*;
        match self {
            FromPeerMessage::QualityControlOwnership { .. } => QUALITY_CONTROL_OWNERSHIP,
            FromPeerMessage::Response { .. } => RESPONSE,
            FromPeerMessage::Command { .. } => COMMAND,
            FromPeerMessage::FreezeFrame { .. } => FREEZE_FRAME,
            FromPeerMessage::FreezeFrameChunk { .. } => FREEZE_FRAME_CHUNK,
            FromPeerMessage::UnfreezeFrame => UNFREEZE_FRAME,
            FromPeerMessage::VideoEncoderAvgQp { .. } => VIDEO_ENCODER_AVG_QP,
            FromPeerMessage::LatencyTest { .. } => LATENCY_TEST,
            FromPeerMessage::InitialSettings { .. } => INITIAL_SETTINGS,
            FromPeerMessage::FileExtension { .. } => FILE_EXTENSION,
            FromPeerMessage::FileMimeType { .. } => FILE_MIME_TYPE,
            FromPeerMessage::FileContents { .. } => FILE_CONTENTS,
            FromPeerMessage::FileContentsChunk { .. } => FILE_CONTENTS_CHUNK,
            FromPeerMessage::TestEcho { .. } => TEST_ECHO,
            FromPeerMessage::InputControlOwnership { .. } => INPUT_CONTROL_OWNERSHIP,
            FromPeerMessage::GamepadResponse { .. } => GAMEPAD_RESPONSE,
            FromPeerMessage::Protocol { .. } => PROTOCOL,
            FromPeerMessage::Custom { name, .. } => name,
        }
    }

    pub fn to_fields(&self) -> Vec<FieldValue> {
        use FieldValue::*;
        match self {
            FromPeerMessage::QualityControlOwnership { owned }
            | FromPeerMessage::InputControlOwnership { owned } => vec![U8(u8::from(*owned))],
            FromPeerMessage::Response { text }
            | FromPeerMessage::Command { text }
            | FromPeerMessage::TestEcho { text }
            | FromPeerMessage::GamepadResponse { text } => vec![Text(text.clone())],
            FromPeerMessage::FreezeFrame { total_len, chunk }
            | FromPeerMessage::FileContents { total_len, chunk } => {
                vec![U32(*total_len), Bytes(chunk.clone())]
            }
            FromPeerMessage::FreezeFrameChunk { chunk }
            | FromPeerMessage::FileContentsChunk { chunk } => vec![Bytes(chunk.clone())],
            FromPeerMessage::UnfreezeFrame => vec![],
            FromPeerMessage::VideoEncoderAvgQp { qp } => vec![U16(*qp)],
            FromPeerMessage::LatencyTest { report } => vec![Text(report.clone())],
            FromPeerMessage::InitialSettings { settings } => vec![Text(settings.clone())],
            FromPeerMessage::FileExtension { extension } => vec![Text(extension.clone())],
            FromPeerMessage::FileMimeType { mime_type } => vec![Text(mime_type.clone())],
            FromPeerMessage::Protocol { definition } => vec![Text(definition.clone())],
            FromPeerMessage::Custom { fields, .. } => fields.clone(),
        }
    }

    pub fn from_fields(name: &str, fields: Vec<FieldValue>) -> Result<Self, ProtocolError> {
        use names::*;
        let mut r = FieldReader::new(name, fields);
        let message = match name {
            QUALITY_CONTROL_OWNERSHIP => FromPeerMessage::QualityControlOwnership { owned: r.flag()? },
            RESPONSE => FromPeerMessage::Response { text: r.text()? },
            COMMAND => FromPeerMessage::Command { text: r.text()? },
            FREEZE_FRAME => FromPeerMessage::FreezeFrame {
                total_len: r.u32()?,
                chunk: r.bytes()?,
            },
            FREEZE_FRAME_CHUNK => FromPeerMessage::FreezeFrameChunk { chunk: r.bytes()? },
            UNFREEZE_FRAME => FromPeerMessage::UnfreezeFrame,
            VIDEO_ENCODER_AVG_QP => FromPeerMessage::VideoEncoderAvgQp { qp: r.u16()? },
            LATENCY_TEST => FromPeerMessage::LatencyTest { report: r.text()? },
            INITIAL_SETTINGS => FromPeerMessage::InitialSettings {
                settings: r.text()?,
            },
            FILE_EXTENSION => FromPeerMessage::FileExtension {
                extension: r.text()?,
            },
            FILE_MIME_TYPE => FromPeerMessage::FileMimeType {
                mime_type: r.text()?,
            },
            FILE_CONTENTS => FromPeerMessage::FileContents {
                total_len: r.u32()?,
                chunk: r.bytes()?,
            },
            FILE_CONTENTS_CHUNK => FromPeerMessage::FileContentsChunk { chunk: r.bytes()? },
            TEST_ECHO => FromPeerMessage::TestEcho { text: r.text()? },
            INPUT_CONTROL_OWNERSHIP => FromPeerMessage::InputControlOwnership { owned: r.flag()? },
            GAMEPAD_RESPONSE => FromPeerMessage::GamepadResponse { text: r.text()? },
            PROTOCOL => FromPeerMessage::Protocol {
                definition: r.text()?,
            },
            other => {
                return Ok(FromPeerMessage::Custom {
                    name: other.to_owned(),
                    fields: r.into_rest(),
                });
            }
        };
        r.finish()?;
        Ok(message)
    }

    pub fn encode(&self, catalog: &MessageCatalog) -> Result<Bytes, ProtocolError> {
        let spec = catalog.by_name(Direction::FromPeer, self.name())?;
        encode_frame(spec, &self.to_fields())
    }
}

/// Pulls typed values out of a decoded field list in order.
pub struct FieldReader<'a> {
    name: &'a str,
    fields: std::vec::IntoIter<FieldValue>,
}

impl<'a> FieldReader<'a> {
    pub fn new(name: &'a str, fields: Vec<FieldValue>) -> Self {
        Self {
            name,
            fields: fields.into_iter(),
        }
    }

    fn next(&mut self, expected: &str) -> Result<FieldValue, ProtocolError> {
        self.fields.next().ok_or_else(|| {
            ProtocolError::LayoutMismatch(format!("{}: missing {expected} field", self.name))
        })
    }

    fn mismatch(&self, expected: &str, got: &FieldValue) -> ProtocolError {
        ProtocolError::LayoutMismatch(format!("{}: expected {expected}, got {got:?}", self.name))
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        match self.next("uint8")? {
            FieldValue::U8(v) => Ok(v),
            other => Err(self.mismatch("uint8", &other)),
        }
    }

    pub fn flag(&mut self) -> Result<bool, ProtocolError> {
        self.u8().map(|v| v != 0)
    }

    pub fn u16(&mut self) -> Result<u16, ProtocolError> {
        match self.next("uint16")? {
            FieldValue::U16(v) => Ok(v),
            other => Err(self.mismatch("uint16", &other)),
        }
    }

    pub fn i16(&mut self) -> Result<i16, ProtocolError> {
        match self.next("int16")? {
            FieldValue::I16(v) => Ok(v),
            other => Err(self.mismatch("int16", &other)),
        }
    }

    pub fn u32(&mut self) -> Result<u32, ProtocolError> {
        match self.next("uint32")? {
            FieldValue::U32(v) => Ok(v),
            other => Err(self.mismatch("uint32", &other)),
        }
    }

    pub fn f64(&mut self) -> Result<f64, ProtocolError> {
        match self.next("double")? {
            FieldValue::F64(v) => Ok(v),
            other => Err(self.mismatch("double", &other)),
        }
    }

    pub fn text(&mut self) -> Result<String, ProtocolError> {
        match self.next("string")? {
            FieldValue::Text(v) => Ok(v),
            other => Err(self.mismatch("string", &other)),
        }
    }

    pub fn bytes(&mut self) -> Result<Bytes, ProtocolError> {
        match self.next("bytes")? {
            FieldValue::Bytes(v) => Ok(v),
            other => Err(self.mismatch("bytes", &other)),
        }
    }

    pub fn touches(&mut self) -> Result<Vec<TouchPoint>, ProtocolError> {
        let records = match self.next("list")? {
            FieldValue::List(records) => records,
            other => return Err(self.mismatch("list", &other)),
        };
        records
            .into_iter()
            .map(|record| -> Result<TouchPoint, ProtocolError> {
                let mut r = FieldReader::new(self.name, record);
                let touch = TouchPoint {
                    x: r.u16()?,
                    y: r.u16()?,
                    id: r.u8()?,
                    force: r.u8()?,
                    valid: r.flag()?,
                };
                r.finish()?;
                Ok(touch)
            })
            .collect()
    }

    pub fn into_rest(self) -> Vec<FieldValue> {
        self.fields.collect()
    }

    /// Fails if unread fields remain.
    pub fn finish(mut self) -> Result<(), ProtocolError> {
        match self.fields.next() {
            None => Ok(()),
            Some(extra) => Err(ProtocolError::LayoutMismatch(format!(
                "{}: unexpected extra field {extra:?}",
                self.name
            ))),
        }
    }
}
