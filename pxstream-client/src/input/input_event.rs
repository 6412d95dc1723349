use pxstream_core::ToPeerMessage;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Main,
    Auxiliary,
    Secondary,
    Fourth,
    Fifth,
}

impl MouseButton {
    pub fn code(self) -> u8 {
        match self {
            MouseButton::Main => 0,
            MouseButton::Auxiliary => 1,
            MouseButton::Secondary => 2,
            MouseButton::Fourth => 3,
            MouseButton::Fifth => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
}

/// One finger of a touch event. Coordinates and force are normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: u8,
    pub x: f64,
    pub y: f64,
    pub force: f64,
}

/// Quantization bounds for the streamer's video encoder. Lower values mean
/// higher quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    pub min_qp: u8,
    pub max_qp: u8,
}

/// High-level events the application hands to the session.
///
/// Pointer positions are normalized to the video area ([0, 1] per axis),
/// movement deltas to [-1, 1]. Encoding quantizes them for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { key_code: u8, repeat: bool },
    KeyUp { key_code: u8 },
    KeyPress { char_code: u16 },

    MouseEnter,
    MouseLeave,
    MouseDown { button: MouseButton, x: f64, y: f64 },
    MouseUp { button: MouseButton, x: f64, y: f64 },
    MouseDouble { button: MouseButton, x: f64, y: f64 },
    MouseMove { x: f64, y: f64, dx: f64, dy: f64 },
    MouseWheel { delta: i16, x: f64, y: f64 },

    Touch { phase: TouchPhase, touches: Vec<Touch> },

    GamepadConnected,
    GamepadDisconnected { controller: u8 },
    GamepadButton { controller: u8, button: u8, pressed: bool, repeat: bool },
    GamepadAnalog { controller: u8, axis: u8, value: f64 },

    /// Application-defined descriptor, sent as JSON text.
    UiInteraction(Value),
    /// Console-style command descriptor, sent as JSON text.
    Command(Value),

    RequestKeyFrame,
    RequestInitialSettings,
    StartStreaming,
    StopStreaming,
    SetMaxFps(u8),
    SetMaxBitrate { kbps: u32 },
    /// Sent as a command descriptor; needs quality control.
    EncoderSettings(EncoderSettings),
    /// Toggle the streamer's on-screen frame rate counter.
    ShowFps,

    /// Any catalog message, including ones registered at runtime.
    Raw(ToPeerMessage),
}

impl InputEvent {
    /// True for events that count as user activity for idle detection.
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            InputEvent::KeyDown { .. }
                | InputEvent::KeyUp { .. }
                | InputEvent::KeyPress { .. }
                | InputEvent::MouseDown { .. }
                | InputEvent::MouseUp { .. }
                | InputEvent::MouseDouble { .. }
                | InputEvent::MouseMove { .. }
                | InputEvent::MouseWheel { .. }
                | InputEvent::Touch { .. }
                | InputEvent::GamepadButton { .. }
                | InputEvent::GamepadAnalog { .. }
        )
    }

    /// True for events that change stream quality outside the catalog's
    /// quality messages.
    pub fn affects_quality(&self) -> bool {
        matches!(self, InputEvent::EncoderSettings(_))
    }
}

impl From<ToPeerMessage> for InputEvent {
    fn from(message: ToPeerMessage) -> Self {
        InputEvent::Raw(message)
    }
}
